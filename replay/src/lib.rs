//! Deterministic replay of recorded map sessions against simulated
//! collaborators, printing every host notification as a JSON line.

pub mod config;
pub mod driver;
pub mod scenario;
pub mod sim;
