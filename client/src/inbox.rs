use std::cell::RefCell;
use std::collections::VecDeque;

use areamap_shared::{HostCommand, MapEvent};
use tracing::trace;

use crate::engine::{GeometryLoader, MapHost, RenderEngine, StatsStore};
use crate::orchestrator::MapOrchestrator;

/// A host command or map event waiting to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(HostCommand),
    Event(MapEvent),
}

impl Inbound {
    pub fn apply<R, G, S, H>(self, map: &mut MapOrchestrator<R, G, S, H>, now: f64)
    where
        R: RenderEngine,
        G: GeometryLoader,
        S: StatsStore,
        H: MapHost,
    {
        match self {
            Inbound::Command(command) => map.handle_command(now, command),
            Inbound::Event(event) => map.handle_event(now, event),
        }
    }
}

/// Inputs that arrived while the map was already busy, typically a host
/// callback echoing a hover straight back. They are applied in arrival order
/// once the outer call has finished with the map.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: RefCell<VecDeque<Inbound>>,
}

impl Inbox {
    pub fn push(&self, item: Inbound) {
        self.queue.borrow_mut().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Apply everything queued, including inputs queued while draining. Returns how many ran.
    pub fn drain_into<R, G, S, H>(&self, map: &mut MapOrchestrator<R, G, S, H>, now: f64) -> usize
    where
        R: RenderEngine,
        G: GeometryLoader,
        S: StatsStore,
        H: MapHost,
    {
        let mut applied = 0;
        loop {
            // Release the queue before applying so callbacks can push again.
            let next = self.queue.borrow_mut().pop_front();
            let Some(item) = next else {
                break;
            };
            trace!(?item, "applying deferred input");
            item.apply(map, now);
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionConfig;
    use crate::test_support::{RecordingEngine, RecordingHost, RecordingLoader, RecordingStats};
    use areamap_shared::{AreaId, AreaKind};

    type TestMap = MapOrchestrator<RecordingEngine, RecordingLoader, RecordingStats, RecordingHost>;

    fn id(raw: &str) -> AreaId {
        AreaId::from(raw)
    }

    fn map() -> TestMap {
        MapOrchestrator::new(
            InteractionConfig::default(),
            RecordingEngine::default(),
            RecordingLoader::default(),
            RecordingStats::default(),
            RecordingHost::default(),
        )
    }

    #[test]
    fn deferred_hover_echo_is_consumed_once_applied() {
        let mut map = map();
        let inbox = Inbox::default();
        let kind = AreaKind::Primary;
        map.handle_event(0.0, MapEvent::PointerMove { kind, id: Some(id("42")) });
        map.advance(100.0);
        assert_eq!(map.host().hover_changes(), vec![(kind, Some(id("42")))]);

        // Host echoes the hover from inside its own callback.
        inbox.push(Inbound::Command(HostCommand::SetHoveredId {
            kind,
            id: Some(id("42")),
        }));
        assert_eq!(inbox.drain_into(&mut map, 100.0), 1);
        assert!(inbox.is_empty());
        assert!(map.hover(kind).ledger().is_empty());
        assert_eq!(map.hover(kind).state().external, None);

        // A later genuine host hover of the same id is honoured.
        map.handle_event(150.0, MapEvent::PointerLeave { kind });
        map.advance(200.0);
        map.handle_command(
            250.0,
            HostCommand::SetHoveredId {
                kind,
                id: Some(id("42")),
            },
        );
        assert_eq!(map.hover(kind).state().external, Some(id("42")));
    }

    #[test]
    fn drain_keeps_arrival_order() {
        let mut map = map();
        let inbox = Inbox::default();
        inbox.push(Inbound::Command(HostCommand::SetSelectedStat {
            stat_id: Some("income".to_string()),
        }));
        inbox.push(Inbound::Command(HostCommand::SetSelectedStat { stat_id: None }));
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.drain_into(&mut map, 0.0), 2);
        assert_eq!(map.selected_stat(), None);
        assert_eq!(inbox.drain_into(&mut map, 0.0), 0);
    }
}
