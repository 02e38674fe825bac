use std::collections::{BTreeMap, BTreeSet};

use areamap_shared::AreaKind;

/// Identity of a cancellable deferred task. Scheduling an id that is already
/// pending replaces its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Commit the pointer's current candidate once it has dwelled long enough.
    HoverDwell(AreaKind),
    /// Clear map hover after the pointer left a polygon and nothing took over.
    HoverLeave(AreaKind),
    /// Drop the trailing preview id once its fade has played.
    PreviewDecay(AreaKind),
    /// Coalesced refresh of scope, statistics, paint and markers.
    Refresh,
}

/// Deadline table for deferred work. Time is a caller-supplied millisecond
/// clock, so tests can step it deterministically.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    deadlines: BTreeMap<TaskId, f64>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, id: TaskId, now: f64, delay_ms: f64) {
        self.deadlines.insert(id, now + delay_ms.max(0.0));
    }

    /// Schedule only if `id` is not already pending. Returns whether it was scheduled.
    pub fn schedule_if_idle(&mut self, id: TaskId, now: f64, delay_ms: f64) -> bool {
        if self.deadlines.contains_key(&id) {
            return false;
        }
        self.schedule(id, now, delay_ms);
        true
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.deadlines.remove(&id).is_some()
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn deadline(&self, id: TaskId) -> Option<f64> {
        self.deadlines.get(&id).copied()
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.deadlines.values().copied().reduce(f64::min)
    }

    /// Remove and return every task due at `now`, earliest first. Ties keep `TaskId` order.
    pub fn take_due(&mut self, now: f64) -> Vec<TaskId> {
        let mut due: Vec<(f64, TaskId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (_, id) in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

/// What a pending refresh has to redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefreshReason {
    /// Selection or viewport moved; the active scope may have changed.
    Scope,
    /// Raw data, legend mode or visible ids changed.
    Aggregate,
    /// Fill colours need rebuilding.
    Paint,
    /// Extremum markers need replanning.
    Markers,
    /// Camera settled; geometry chunks for the new viewport are needed.
    Viewport,
    /// Camera settled in dynamic legend mode; rendered ids must be re-queried.
    Visibility,
}

/// Coalesces refresh requests into one scheduled frame.
#[derive(Debug, Default)]
pub struct RefreshQueue {
    dirty: BTreeSet<RefreshReason>,
}

impl RefreshQueue {
    /// Mark `reason` dirty and make sure exactly one refresh task is pending.
    /// Returns `true` if this call scheduled the frame.
    pub fn request(
        &mut self,
        reason: RefreshReason,
        scheduler: &mut TaskScheduler,
        now: f64,
        frame_ms: f64,
    ) -> bool {
        self.dirty.insert(reason);
        scheduler.schedule_if_idle(TaskId::Refresh, now, frame_ms)
    }

    pub fn take(&mut self) -> BTreeSet<RefreshReason> {
        std::mem::take(&mut self.dirty)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}

/// Token attached to an async collaborator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

/// Monotonic generation source. Only the most recently issued token is current.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    latest: u64,
}

impl GenerationCounter {
    pub fn issue(&mut self) -> Generation {
        self.latest += 1;
        Generation(self.latest)
    }

    pub fn latest(&self) -> Generation {
        Generation(self.latest)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.latest
    }
}
