//! Collaborator interfaces: rendering engine, geometry loader, statistics
//! store and host UI. The orchestrator only talks to the outside world
//! through these traits.

use areamap_shared::{AreaId, AreaIdSet, AreaKind, Bounds, MapNotification, StatisticId};
use tracing::debug;

use crate::extrema::Marker;
use crate::paint::FillPaint;
use crate::scheduler::Generation;

/// Pixel rectangle on the map canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Highlight filter layers the engine keeps per area kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HighlightLayer {
    Selected,
    /// Committed hover, full weight.
    Hover,
    /// Raw pointer preview, lighter weight.
    Preview,
    /// Fading previous preview.
    Trailing,
    /// Opposite extremum marker of the hovered one, in the label layer.
    LinkedLabel,
}

impl HighlightLayer {
    pub const ALL: [HighlightLayer; 5] = [
        HighlightLayer::Selected,
        HighlightLayer::Hover,
        HighlightLayer::Preview,
        HighlightLayer::Trailing,
        HighlightLayer::LinkedLabel,
    ];
}

/// Vector-map rendering engine. Calls can fail while a style reload is in
/// progress; the orchestrator swallows every error.
pub trait RenderEngine {
    fn set_highlight(
        &mut self,
        layer: HighlightLayer,
        kind: AreaKind,
        ids: &AreaIdSet,
    ) -> Result<(), String>;

    fn set_fill_paint(&mut self, kind: AreaKind, paint: &FillPaint) -> Result<(), String>;

    fn set_markers(&mut self, markers: &[Marker]) -> Result<(), String>;

    fn query_rendered_ids(&self, kind: AreaKind, rect: ScreenRect) -> Result<AreaIdSet, String>;

    fn fit_camera(&mut self, bounds: Bounds) -> Result<(), String>;
}

/// Geometry chunk loader. Loaded chunks come back through
/// `MapOrchestrator::on_chunks_loaded` tagged with the request's generation.
pub trait GeometryLoader {
    fn ensure_viewport(&mut self, bounds: Bounds, generation: Generation);

    fn ensure_ids(&mut self, kind: AreaKind, ids: &[AreaId], generation: Generation);

    /// Drop loaded geometry of `kind` whose id is not in `keep`.
    fn prune_except(&mut self, kind: AreaKind, keep: &AreaIdSet);
}

/// Statistics data store. Updates come back through
/// `MapOrchestrator::on_stats_update`.
pub trait StatsStore {
    fn prioritize(&mut self, stat_ids: &[StatisticId]);

    fn set_scope(&mut self, names: &[String], generation: Generation);
}

/// Outbound host callbacks.
pub trait MapHost {
    fn on_area_selection_change(
        &mut self,
        kind: AreaKind,
        selected: &[AreaId],
        pinned: &[AreaId],
        transient: &[AreaId],
    );

    fn on_area_hover_change(&mut self, kind: AreaKind, id: Option<&AreaId>);

    fn on_stat_selection_change(&mut self, stat_id: Option<&str>);

    fn on_boundary_mode_change(&mut self, kind: AreaKind);
}

/// Records every notification, in order.
impl MapHost for Vec<MapNotification> {
    fn on_area_selection_change(
        &mut self,
        kind: AreaKind,
        selected: &[AreaId],
        pinned: &[AreaId],
        transient: &[AreaId],
    ) {
        self.push(MapNotification::AreaSelectionChange {
            kind,
            selected: selected.to_vec(),
            pinned: pinned.to_vec(),
            transient: transient.to_vec(),
        });
    }

    fn on_area_hover_change(&mut self, kind: AreaKind, id: Option<&AreaId>) {
        self.push(MapNotification::AreaHoverChange {
            kind,
            id: id.cloned(),
        });
    }

    fn on_stat_selection_change(&mut self, stat_id: Option<&str>) {
        self.push(MapNotification::StatSelectionChange {
            stat_id: stat_id.map(str::to_string),
        });
    }

    fn on_boundary_mode_change(&mut self, kind: AreaKind) {
        self.push(MapNotification::BoundaryModeChange { kind });
    }
}

/// Drop an engine error after logging it.
pub(crate) fn swallow<T>(op: &'static str, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(op, error = %e, "engine call failed, ignoring");
            None
        }
    }
}
