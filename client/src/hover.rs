use areamap_shared::{AreaId, AreaKind};
use tracing::{debug, trace};

use crate::config::InteractionConfig;
use crate::echo::EchoLedger;
use crate::scheduler::{TaskId, TaskScheduler};

/// Where a hover signal came from, in descending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoverSource {
    External,
    LabelBadge,
    MapPointer,
}

/// Paint weight for the visual hover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverWeight {
    /// Some source has won; full highlight.
    Committed,
    /// Only the raw pointer preview is active; lighter highlight.
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualHover {
    pub id: AreaId,
    pub weight: HoverWeight,
}

/// Hover signals for one area kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverState {
    pub external: Option<AreaId>,
    pub label_badge: Option<AreaId>,
    pub map_committed: Option<AreaId>,
    pub map_preview: Option<AreaId>,
    /// Previous preview id, kept briefly so its highlight can fade out.
    pub map_preview_trailing: Option<AreaId>,
}

impl HoverState {
    /// First non-empty of external, label badge, committed map hover.
    pub fn authoritative(&self) -> Option<&AreaId> {
        self.external
            .as_ref()
            .or(self.label_badge.as_ref())
            .or(self.map_committed.as_ref())
    }

    pub fn source(&self) -> Option<HoverSource> {
        if self.external.is_some() {
            Some(HoverSource::External)
        } else if self.label_badge.is_some() {
            Some(HoverSource::LabelBadge)
        } else if self.map_committed.is_some() {
            Some(HoverSource::MapPointer)
        } else {
            None
        }
    }

    /// What to paint: the authoritative id, or failing that the raw preview.
    pub fn visual(&self) -> Option<VisualHover> {
        if let Some(id) = self.authoritative() {
            return Some(VisualHover {
                id: id.clone(),
                weight: HoverWeight::Committed,
            });
        }
        self.map_preview.as_ref().map(|id| VisualHover {
            id: id.clone(),
            weight: HoverWeight::Preview,
        })
    }

    /// Raw preview painted at preview weight. While the pointer owns the committed
    /// hover, a different polygon under it still lights up before its own dwell
    /// commits. External and badge hovers suppress it.
    pub fn preview_overlay(&self) -> Option<&AreaId> {
        match self.source() {
            Some(HoverSource::External | HoverSource::LabelBadge) => None,
            Some(HoverSource::MapPointer) => self
                .map_preview
                .as_ref()
                .filter(|preview| self.map_committed.as_ref() != Some(*preview)),
            None => self.map_preview.as_ref(),
        }
    }

    fn has_map_signal(&self) -> bool {
        self.map_committed.is_some()
            || self.map_preview.is_some()
            || self.map_preview_trailing.is_some()
    }
}

/// Result of feeding one signal into the arbiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverOutcome {
    /// Hover highlight layers need repainting.
    pub repaint: bool,
    /// New authoritative id to report to the host.
    pub forward: Option<Option<AreaId>>,
}

impl HoverOutcome {
    fn repaint() -> Self {
        Self {
            repaint: true,
            forward: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HoverTimings {
    dwell_ms: f64,
    leave_grace_ms: f64,
    preview_trailing_ms: f64,
}

/// Merges external, label-badge and map-pointer hover for one area kind into
/// one authoritative id, with debounced commit, a decaying preview trail and
/// echo suppression.
#[derive(Debug, Clone)]
pub struct HoverArbiter {
    kind: AreaKind,
    state: HoverState,
    /// Polygon the pointer is dwelling on, committed when the dwell timer fires.
    candidate: Option<AreaId>,
    pointer_inside: bool,
    ledger: EchoLedger,
    /// Last authoritative id the host is known to have.
    reported: Option<AreaId>,
    /// A forward was held back by a drag.
    queued: bool,
    timings: HoverTimings,
}

impl HoverArbiter {
    pub fn new(kind: AreaKind, config: &InteractionConfig) -> Self {
        Self {
            kind,
            state: HoverState::default(),
            candidate: None,
            pointer_inside: false,
            ledger: EchoLedger::new(config.echo_window_ms),
            reported: None,
            queued: false,
            timings: HoverTimings {
                dwell_ms: config.dwell_ms,
                leave_grace_ms: config.leave_grace_ms,
                preview_trailing_ms: config.preview_trailing_ms,
            },
        }
    }

    pub fn kind(&self) -> AreaKind {
        self.kind
    }

    pub fn state(&self) -> &HoverState {
        &self.state
    }

    pub fn authoritative(&self) -> Option<&AreaId> {
        self.state.authoritative()
    }

    pub fn candidate(&self) -> Option<&AreaId> {
        self.candidate.as_ref()
    }

    pub fn ledger(&self) -> &EchoLedger {
        &self.ledger
    }

    pub fn has_queued_forward(&self) -> bool {
        self.queued
    }

    /// Host-issued hover. Echoes of ids this map forwarded are consumed and ignored.
    pub fn external_command(
        &mut self,
        id: Option<AreaId>,
        now: f64,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        if let Some(echo) = id.as_ref()
            && self.ledger.consume(echo, now)
        {
            debug!(kind = %self.kind, id = %echo, "ignoring hover echo from host");
            return HoverOutcome::default();
        }
        if self.state.external == id {
            return HoverOutcome::default();
        }

        self.state.external = id;
        scheduler.cancel(TaskId::HoverDwell(self.kind));
        self.candidate = None;
        self.clear_preview(scheduler);
        self.settle_from_host();
        HoverOutcome::repaint()
    }

    /// Hover over a label badge. `None` means the pointer left the badge.
    pub fn badge_hover(
        &mut self,
        id: Option<AreaId>,
        now: f64,
        dragging: bool,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        scheduler.cancel(TaskId::HoverLeave(self.kind));
        if self.state.label_badge == id {
            return HoverOutcome::default();
        }
        self.state.label_badge = id;

        // Leaving a badge while the pointer is off every polygon must still let map hover expire.
        if self.state.label_badge.is_none() && !self.pointer_inside && self.state.has_map_signal() {
            scheduler.schedule(
                TaskId::HoverLeave(self.kind),
                now,
                self.timings.leave_grace_ms,
            );
        }

        HoverOutcome {
            repaint: true,
            forward: self.settle_from_map(now, dragging),
        }
    }

    /// Pointer moved over the boundary layer. `None` is treated as leaving.
    pub fn pointer_move(
        &mut self,
        id: Option<AreaId>,
        now: f64,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        let Some(id) = id else {
            return self.pointer_leave(now, scheduler);
        };
        self.pointer_inside = true;
        scheduler.cancel(TaskId::HoverLeave(self.kind));

        let mut outcome = HoverOutcome::default();
        if self.state.map_preview.as_ref() != Some(&id) {
            if let Some(previous) = self.state.map_preview.take() {
                self.state.map_preview_trailing = Some(previous);
                scheduler.schedule(
                    TaskId::PreviewDecay(self.kind),
                    now,
                    self.timings.preview_trailing_ms,
                );
            }
            self.state.map_preview = Some(id.clone());
            outcome.repaint = true;
        }

        if self.state.map_committed.as_ref() == Some(&id) {
            scheduler.cancel(TaskId::HoverDwell(self.kind));
            self.candidate = None;
        } else {
            self.candidate = Some(id);
            scheduler.schedule(TaskId::HoverDwell(self.kind), now, self.timings.dwell_ms);
        }
        outcome
    }

    /// Pointer left a polygon. State survives for the grace interval.
    pub fn pointer_leave(&mut self, now: f64, scheduler: &mut TaskScheduler) -> HoverOutcome {
        self.pointer_inside = false;
        scheduler.cancel(TaskId::HoverDwell(self.kind));
        self.candidate = None;
        if self.state.has_map_signal() {
            scheduler.schedule(
                TaskId::HoverLeave(self.kind),
                now,
                self.timings.leave_grace_ms,
            );
        }
        HoverOutcome::default()
    }

    /// Dwell timer fired: promote the candidate to the committed map hover.
    pub fn dwell_expired(
        &mut self,
        now: f64,
        dragging: bool,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        let Some(id) = self.candidate.take() else {
            return HoverOutcome::default();
        };
        trace!(kind = %self.kind, %id, "hover dwell committed");
        self.state.map_committed = Some(id);
        self.clear_preview(scheduler);
        HoverOutcome {
            repaint: true,
            forward: self.settle_from_map(now, dragging),
        }
    }

    /// Grace timer fired without anything taking over: drop all map hover state.
    pub fn leave_expired(
        &mut self,
        now: f64,
        dragging: bool,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        self.clear_map(scheduler)
            .then(|| HoverOutcome {
                repaint: true,
                forward: self.settle_from_map(now, dragging),
            })
            .unwrap_or_default()
    }

    pub fn preview_decay_expired(&mut self) -> HoverOutcome {
        if self.state.map_preview_trailing.take().is_some() {
            HoverOutcome::repaint()
        } else {
            HoverOutcome::default()
        }
    }

    /// Drop map-pointer hover immediately, e.g. when the boundary mode switches away.
    pub fn reset_map(
        &mut self,
        now: f64,
        dragging: bool,
        scheduler: &mut TaskScheduler,
    ) -> HoverOutcome {
        self.pointer_inside = false;
        scheduler.cancel(TaskId::HoverLeave(self.kind));
        self.leave_expired(now, dragging, scheduler)
    }

    /// Motion ended: release a forward that was held back during the drag.
    pub fn flush_queued(&mut self, now: f64) -> Option<Option<AreaId>> {
        if !self.queued {
            return None;
        }
        self.settle_from_map(now, false)
    }

    fn clear_preview(&mut self, scheduler: &mut TaskScheduler) {
        self.state.map_preview = None;
        self.state.map_preview_trailing = None;
        scheduler.cancel(TaskId::PreviewDecay(self.kind));
    }

    fn clear_map(&mut self, scheduler: &mut TaskScheduler) -> bool {
        let had = self.state.has_map_signal();
        scheduler.cancel(TaskId::HoverDwell(self.kind));
        self.candidate = None;
        self.state.map_committed = None;
        self.clear_preview(scheduler);
        had
    }

    /// The host caused this change, so it already knows; record without forwarding.
    fn settle_from_host(&mut self) {
        self.reported = self.state.authoritative().cloned();
        self.queued = false;
    }

    fn settle_from_map(&mut self, now: f64, dragging: bool) -> Option<Option<AreaId>> {
        let current = self.state.authoritative().cloned();
        if current == self.reported {
            self.queued = false;
            return None;
        }
        if dragging {
            self.queued = true;
            return None;
        }
        self.queued = false;
        if let Some(id) = current.as_ref() {
            self.ledger.register(id, now);
        }
        self.reported = current.clone();
        Some(current)
    }
}
