use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use areamap_replay::config::{self, ReplayConfig};
use areamap_replay::driver::{Session, TimedNotification, run_realtime, run_virtual};
use areamap_replay::scenario::Scenario;

fn print_line(notification: &TimedNotification) {
    match serde_json::to_string(notification) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to encode notification"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(config::scenario_path)
    else {
        tracing::error!("usage: areamap-replay <scenario.json> (or set AREAMAP_SCENARIO)");
        return ExitCode::FAILURE;
    };
    let scenario = match Scenario::load(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            tracing::error!(error = %e, "failed to load scenario");
            return ExitCode::FAILURE;
        }
    };

    let config = ReplayConfig::from_env(scenario.config.clone());
    tracing::info!(
        path = %path.display(),
        areas = scenario.areas.len(),
        steps = scenario.timeline.len(),
        duration_ms = scenario.duration_ms(),
        realtime = config.realtime,
        "replaying scenario"
    );

    let session = Session::new(scenario, &config);
    let summary = if config.realtime {
        run_realtime(session, print_line).await
    } else {
        run_virtual(session, print_line)
    };

    tracing::info!(
        notifications = summary.notifications.len(),
        tasks_fired = summary.tasks_fired,
        stale_dropped = summary.stale_dropped,
        steps = summary.steps,
        "replay finished"
    );
    ExitCode::SUCCESS
}
