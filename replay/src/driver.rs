use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use areamap_client::MapOrchestrator;
use areamap_shared::{HostCommand, MapEvent, MapNotification, Versioned};
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ReplayConfig;
use crate::scenario::{Action, Scenario, Step};
use crate::sim::{SimClock, SimEngine, SimLoader, SimStats};

/// Hard stop for runaway sessions (e.g. a collaborator that keeps re-arming itself).
const MAX_STEPS: usize = 100_000;

pub type SimMap = MapOrchestrator<SimEngine, SimLoader, SimStats, Vec<MapNotification>>;

/// One notification as the host would have received it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedNotification {
    pub at_ms: f64,
    #[serde(flatten)]
    pub message: Versioned<MapNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub notifications: Vec<TimedNotification>,
    pub tasks_fired: usize,
    pub stale_dropped: usize,
    pub steps: usize,
}

/// Drives one orchestrator through a scenario against simulated collaborators.
pub struct Session {
    map: SimMap,
    clock: SimClock,
    timeline: VecDeque<Step>,
    summary: Summary,
}

impl Session {
    pub fn new(scenario: Scenario, config: &ReplayConfig) -> Self {
        let clock: SimClock = Rc::new(Cell::new(0.0));
        let started_at = scenario.started_at();
        let interaction = config.interaction.clone().sanitized();
        let engine = SimEngine::new(
            &scenario.areas,
            interaction.canvas_width,
            interaction.canvas_height,
        );
        let loader = SimLoader::new(scenario.areas, config.chunk_latency_ms, clock.clone());
        let stats = SimStats::new(
            scenario.stats,
            config.stats_latency_ms,
            clock.clone(),
            started_at,
        );
        let mut map = MapOrchestrator::new(interaction, engine, loader, stats, Vec::new());
        map.handle_command(
            0.0,
            HostCommand::SetStatDescriptors {
                descriptors: scenario.descriptors,
            },
        );
        map.handle_command(
            0.0,
            HostCommand::SetPointsOfInterest {
                points: scenario.points,
            },
        );
        Self {
            map,
            clock,
            timeline: scenario.timeline.into(),
            summary: Summary::default(),
        }
    }

    pub fn map(&self) -> &SimMap {
        &self.map
    }

    pub fn now(&self) -> f64 {
        self.clock.get()
    }

    /// Earliest time anything can happen next, or `None` once the session is quiet.
    pub fn next_instant(&self) -> Option<f64> {
        [
            self.timeline.front().map(|s| s.at_ms),
            self.map.next_deadline(),
            self.map.loader().next_ready(),
            self.map.stats().next_ready(),
        ]
        .into_iter()
        .flatten()
        .reduce(f64::min)
        .map(|t| t.max(self.clock.get()))
    }

    /// Deliver everything due at `t`: collaborator responses, timeline steps, then timers.
    pub fn step_at(&mut self, t: f64) -> Vec<TimedNotification> {
        self.clock.set(t);
        self.summary.steps += 1;

        for (generation, chunks) in self.map.loader_mut().take_ready(t) {
            if !self.map.on_chunks_loaded(t, generation, chunks) {
                self.summary.stale_dropped += 1;
            }
        }
        for update in self.map.stats_mut().take_ready(t) {
            if !self.map.on_stats_update(t, update) {
                self.summary.stale_dropped += 1;
            }
        }
        while self.timeline.front().is_some_and(|s| s.at_ms <= t) {
            if let Some(step) = self.timeline.pop_front() {
                self.dispatch(t, step.action);
            }
        }
        self.settle_camera(t);
        self.summary.tasks_fired += self.map.advance(t);
        self.settle_camera(t);

        let emitted: Vec<TimedNotification> = std::mem::take(self.map.host_mut())
            .into_iter()
            .map(|n| TimedNotification {
                at_ms: t,
                message: Versioned::new(n),
            })
            .collect();
        self.summary.notifications.extend(emitted.iter().cloned());
        emitted
    }

    fn dispatch(&mut self, t: f64, action: Action) {
        match action {
            Action::Command(command) => self.map.handle_command(t, command),
            Action::Event(event) => {
                if let MapEvent::CameraSettled { bounds, .. } = &event {
                    self.map.engine_mut().show(bounds);
                }
                self.map.handle_event(t, event);
            }
            Action::Pointer { kind, x, y } => {
                let id = self.map.engine().hit_test(kind, x, y);
                self.map.handle_event(t, MapEvent::PointerMove { kind, id });
            }
        }
    }

    /// A camera fit requested by the map lands as a settle event at the same instant.
    fn settle_camera(&mut self, t: f64) {
        if let Some((bounds, zoom)) = self.map.engine_mut().take_pending_settle() {
            debug!(?bounds, zoom, "camera settled after fit");
            self.map.handle_event(t, MapEvent::CameraSettled { bounds, zoom });
        }
    }

    pub fn into_summary(self) -> Summary {
        self.summary
    }
}

/// Jump straight from one instant to the next.
pub fn run_virtual(mut session: Session, mut emit: impl FnMut(&TimedNotification)) -> Summary {
    while let Some(t) = session.next_instant() {
        if session.summary.steps >= MAX_STEPS {
            warn!(steps = MAX_STEPS, "replay step limit reached, stopping");
            break;
        }
        for notification in session.step_at(t) {
            emit(&notification);
        }
    }
    session.into_summary()
}

/// Sleep on the tokio clock until each instant, pacing the replay like a live page.
pub async fn run_realtime(
    mut session: Session,
    mut emit: impl FnMut(&TimedNotification),
) -> Summary {
    let start = Instant::now();
    while let Some(t) = session.next_instant() {
        if session.summary.steps >= MAX_STEPS {
            warn!(steps = MAX_STEPS, "replay step limit reached, stopping");
            break;
        }
        tokio::time::sleep_until(start + Duration::from_secs_f64(t / 1000.0)).await;
        for notification in session.step_at(t) {
            emit(&notification);
        }
    }
    session.into_summary()
}

#[cfg(test)]
mod tests {
    use super::*;
    use areamap_client::HighlightLayer;
    use areamap_shared::{AreaId, AreaIdSet, AreaKind, LegendRangeMode};

    const AUSTIN: &str = include_str!("../../demos/austin.json");

    fn austin() -> Session {
        let scenario = Scenario::parse(AUSTIN).expect("demo scenario parses");
        Session::new(scenario, &ReplayConfig::default())
    }

    fn brief(n: &TimedNotification) -> (f64, String) {
        let what = match &n.message.payload {
            MapNotification::AreaSelectionChange { kind, selected, .. } => {
                let ids: Vec<&str> = selected.iter().map(AreaId::as_str).collect();
                format!("select {kind} [{}]", ids.join(","))
            }
            MapNotification::AreaHoverChange { kind, id } => {
                format!("hover {kind} {}", id.as_ref().map_or("-", AreaId::as_str))
            }
            MapNotification::StatSelectionChange { stat_id } => {
                format!("stat {}", stat_id.as_deref().unwrap_or("-"))
            }
            MapNotification::BoundaryModeChange { kind } => format!("mode {kind}"),
        };
        (n.at_ms, what)
    }

    fn expected() -> Vec<(f64, String)> {
        vec![
            (160.0, "hover primary 78701".to_string()),
            (200.0, "select primary [78703]".to_string()),
            (345.0, "hover primary -".to_string()),
            (400.0, "stat unemployment".to_string()),
            (600.0, "select primary []".to_string()),
        ]
    }

    #[test]
    fn austin_replay_produces_expected_notifications() {
        let mut streamed = Vec::new();
        let summary = run_virtual(austin(), |n| streamed.push(n.clone()));

        let got: Vec<(f64, String)> = summary.notifications.iter().map(brief).collect();
        assert_eq!(got, expected());
        assert_eq!(streamed, summary.notifications);
        assert!(summary.tasks_fired > 0);
        assert_eq!(summary.stale_dropped, 0);
    }

    #[test]
    fn session_state_after_each_phase() {
        let mut session = austin();

        while let Some(t) = session.next_instant() {
            if t > 100.0 {
                break;
            }
            session.step_at(t);
        }
        let map = session.map();
        assert_eq!(map.active_scope(), Some("travis"));
        assert_eq!(map.selected_stat(), Some("median_income"));
        assert!(!map.is_loading());
        assert!(map.refreshed_at().is_some());
        let fill = map.engine().fill(AreaKind::Primary).expect("primary paint pushed");
        assert!(fill.color_of(&AreaId::from("78701")).is_some());
        assert!(map.scope_set().contains("hays"));
        assert!(map.scope_set().contains("williamson"));
        assert_eq!(
            map.engine().highlight(HighlightLayer::Preview, AreaKind::Primary),
            AreaIdSet::from([AreaId::from("78701")])
        );

        while let Some(t) = session.next_instant() {
            session.step_at(t);
        }
        let map = session.map();
        assert_eq!(map.legend_mode(), LegendRangeMode::Dynamic);
        assert_eq!(map.selected_stat(), Some("unemployment"));
        assert!(map.selection(AreaKind::Primary).is_empty());
        assert_eq!(map.hovered_id(AreaKind::Primary), None);
        assert!(map.stats().prioritized().contains(&"unemployment".to_string()));
    }

    #[test]
    fn superseded_viewport_responses_are_dropped() {
        let scenario = Scenario::parse(
            r#"{
                "areas": [
                    { "id": "travis", "kind": "aggregate", "bounds": { "min_x": 0, "min_y": 0, "max_x": 10, "max_y": 10 } }
                ],
                "timeline": [
                    { "at_ms": 0, "event": { "type": "camera_settled", "bounds": { "min_x": 0, "min_y": 0, "max_x": 5, "max_y": 5 }, "zoom": 9 } },
                    { "at_ms": 4, "event": { "type": "camera_settled", "bounds": { "min_x": 1, "min_y": 1, "max_x": 6, "max_y": 6 }, "zoom": 9 } }
                ]
            }"#,
        )
        .expect("scenario parses");
        let summary = run_virtual(Session::new(scenario, &ReplayConfig::default()), |_| {});
        assert_eq!(summary.stale_dropped, 1);
        assert!(summary.notifications.is_empty());
    }

    #[test]
    fn fly_to_selection_settles_the_camera() {
        let mut scenario = Scenario::parse(AUSTIN).expect("demo scenario parses");
        scenario.config.fly_to_selection = true;
        let config = ReplayConfig {
            interaction: scenario.config.clone(),
            ..ReplayConfig::default()
        };
        let mut session = Session::new(scenario, &config);
        while let Some(t) = session.next_instant() {
            if t > 200.0 {
                break;
            }
            session.step_at(t);
        }
        let visible = session.map().engine().visible_bounds();
        assert!(visible.contains_point(2.0, 6.0));
        assert!(!visible.contains_point(15.0, 5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn realtime_run_matches_virtual_run() {
        let realtime = run_realtime(austin(), |_| {}).await;
        let virtual_run = run_virtual(austin(), |_| {});
        assert_eq!(realtime.notifications, virtual_run.notifications);
        assert_eq!(realtime.tasks_fired, virtual_run.tasks_fired);
    }
}
