use std::collections::HashMap;

use areamap_shared::AreaId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoEntry {
    pub count: u32,
    pub last_queued_at: f64,
}

/// Hover ids this map already forwarded to the host, so the host's
/// re-broadcast of the same id is not mistaken for a new external command.
/// Entries older than `window_ms` expire and stop matching.
#[derive(Debug, Clone)]
pub struct EchoLedger {
    entries: HashMap<AreaId, EchoEntry>,
    window_ms: f64,
}

impl EchoLedger {
    pub fn new(window_ms: f64) -> Self {
        Self {
            entries: HashMap::new(),
            window_ms,
        }
    }

    pub fn register(&mut self, id: &AreaId, now: f64) {
        self.prune(now);
        let entry = self.entries.entry(id.clone()).or_insert(EchoEntry {
            count: 0,
            last_queued_at: now,
        });
        entry.count += 1;
        entry.last_queued_at = now;
    }

    /// Consume one pending echo of `id`. Returns `true` if the command should be ignored.
    pub fn consume(&mut self, id: &AreaId, now: f64) -> bool {
        self.prune(now);
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.count = entry.count.saturating_sub(1);
        if entry.count == 0 {
            self.entries.remove(id);
        }
        true
    }

    pub fn pending(&self, id: &AreaId) -> Option<EchoEntry> {
        self.entries.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, now: f64) {
        let window = self.window_ms;
        self.entries
            .retain(|_, entry| now - entry.last_queued_at <= window);
    }
}
