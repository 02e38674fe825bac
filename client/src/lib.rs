pub mod aggregate;
pub mod chunks;
pub mod config;
pub mod echo;
pub mod engine;
pub mod extrema;
pub mod hover;
pub mod inbox;
pub mod orchestrator;
pub mod paint;
pub mod scheduler;
pub mod scope;
pub mod selection;
pub mod visibility;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

#[cfg(test)]
mod test_support;

pub use config::InteractionConfig;
pub use engine::{GeometryLoader, HighlightLayer, MapHost, RenderEngine, ScreenRect, StatsStore};
pub use orchestrator::MapOrchestrator;
pub use scheduler::Generation;
