//! Recording collaborators for orchestrator tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use areamap_shared::{AreaId, AreaIdSet, AreaKind, Bounds, MapNotification, StatisticId};

use crate::engine::{
    GeometryLoader, HighlightLayer, MapHost, RenderEngine, ScreenRect, StatsStore,
};
use crate::extrema::Marker;
use crate::paint::FillPaint;
use crate::scheduler::Generation;

/// Call log shared between the engine and the host, to check ordering.
pub type Journal = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub journal: Journal,
    pub highlights: BTreeMap<(HighlightLayer, AreaKind), AreaIdSet>,
    pub fills: BTreeMap<AreaKind, FillPaint>,
    pub fill_calls: usize,
    pub markers: Vec<Marker>,
    pub fitted: Vec<Bounds>,
    /// What `query_rendered_ids` answers.
    pub rendered: AreaIdSet,
    /// Every call fails, as while a style reload is in progress.
    pub failing: bool,
}

impl RecordingEngine {
    pub fn highlight(&self, layer: HighlightLayer, kind: AreaKind) -> AreaIdSet {
        self.highlights
            .get(&(layer, kind))
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, call: String) -> Result<(), String> {
        if self.failing {
            return Err(format!("layer missing for {call}"));
        }
        self.journal.borrow_mut().push(call);
        Ok(())
    }
}

impl RenderEngine for RecordingEngine {
    fn set_highlight(
        &mut self,
        layer: HighlightLayer,
        kind: AreaKind,
        ids: &AreaIdSet,
    ) -> Result<(), String> {
        self.check(format!("highlight {layer:?} {kind}"))?;
        self.highlights.insert((layer, kind), ids.clone());
        Ok(())
    }

    fn set_fill_paint(&mut self, kind: AreaKind, paint: &FillPaint) -> Result<(), String> {
        self.check(format!("fill {kind}"))?;
        self.fill_calls += 1;
        self.fills.insert(kind, paint.clone());
        Ok(())
    }

    fn set_markers(&mut self, markers: &[Marker]) -> Result<(), String> {
        self.check("markers".to_string())?;
        self.markers = markers.to_vec();
        Ok(())
    }

    fn query_rendered_ids(&self, _kind: AreaKind, _rect: ScreenRect) -> Result<AreaIdSet, String> {
        if self.failing {
            return Err("source not loaded".to_string());
        }
        Ok(self.rendered.clone())
    }

    fn fit_camera(&mut self, bounds: Bounds) -> Result<(), String> {
        self.check("fit_camera".to_string())?;
        self.fitted.push(bounds);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLoader {
    pub viewport_requests: Vec<(Bounds, Generation)>,
    pub id_requests: Vec<(AreaKind, Vec<AreaId>, Generation)>,
    pub prunes: Vec<(AreaKind, AreaIdSet)>,
}

impl GeometryLoader for RecordingLoader {
    fn ensure_viewport(&mut self, bounds: Bounds, generation: Generation) {
        self.viewport_requests.push((bounds, generation));
    }

    fn ensure_ids(&mut self, kind: AreaKind, ids: &[AreaId], generation: Generation) {
        self.id_requests.push((kind, ids.to_vec(), generation));
    }

    fn prune_except(&mut self, kind: AreaKind, keep: &AreaIdSet) {
        self.prunes.push((kind, keep.clone()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingStats {
    pub prioritized: Vec<Vec<StatisticId>>,
    pub scopes: Vec<(Vec<String>, Generation)>,
}

impl StatsStore for RecordingStats {
    fn prioritize(&mut self, stat_ids: &[StatisticId]) {
        self.prioritized.push(stat_ids.to_vec());
    }

    fn set_scope(&mut self, names: &[String], generation: Generation) {
        self.scopes.push((names.to_vec(), generation));
    }
}

/// Host that records notifications and journals them next to engine calls.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub journal: Journal,
    pub notifications: Vec<MapNotification>,
}

impl RecordingHost {
    pub fn hover_changes(&self) -> Vec<(AreaKind, Option<AreaId>)> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                MapNotification::AreaHoverChange { kind, id } => Some((*kind, id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn selection_changes(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| matches!(n, MapNotification::AreaSelectionChange { .. }))
            .count()
    }

    fn record(&mut self, label: &str) {
        self.journal.borrow_mut().push(format!("notify {label}"));
    }
}

impl MapHost for RecordingHost {
    fn on_area_selection_change(
        &mut self,
        kind: AreaKind,
        selected: &[AreaId],
        pinned: &[AreaId],
        transient: &[AreaId],
    ) {
        self.record("selection");
        self.notifications.on_area_selection_change(kind, selected, pinned, transient);
    }

    fn on_area_hover_change(&mut self, kind: AreaKind, id: Option<&AreaId>) {
        self.record("hover");
        self.notifications.on_area_hover_change(kind, id);
    }

    fn on_stat_selection_change(&mut self, stat_id: Option<&str>) {
        self.record("stat");
        self.notifications.on_stat_selection_change(stat_id);
    }

    fn on_boundary_mode_change(&mut self, kind: AreaKind) {
        self.record("boundary_mode");
        self.notifications.on_boundary_mode_change(kind);
    }
}

pub fn ids(raw: &[&str]) -> AreaIdSet {
    raw.iter().map(|s| AreaId::from(*s)).collect()
}
