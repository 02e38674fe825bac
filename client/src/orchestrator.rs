//! The single writer for selection, hover and overlay state.
//!
//! Host commands, map events, timer expiries and collaborator responses all
//! enter through [`MapOrchestrator`]. Highlights are pushed to the engine
//! before the host hears about a change; expensive work (scope resolution,
//! aggregation, paint, markers, geometry pruning) is coalesced into one
//! scheduled refresh frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use areamap_shared::{
    AreaId, AreaIdSet, AreaKind, Bounds, ChunkSummary, HostCommand, LegendRangeMode, MapEvent,
    PointOfInterest, RawStatTable, StatDescriptor, StatisticId, StatsUpdate,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::aggregate::{AggregationInput, LegendRange, ScopedStatTable, aggregate};
use crate::chunks::ChunkIndex;
use crate::config::InteractionConfig;
use crate::engine::{GeometryLoader, HighlightLayer, MapHost, RenderEngine, StatsStore, swallow};
use crate::extrema::{MarkerPlan, PlanInput, plan_markers};
use crate::hover::{HoverArbiter, HoverOutcome};
use crate::paint::FillPaint;
use crate::scheduler::{
    Generation, GenerationCounter, RefreshQueue, RefreshReason, TaskId, TaskScheduler,
};
use crate::scope::{ScopeSet, ScopeTunables, resolve_scope_set};
use crate::selection::{SelectionState, SelectionStore};
use crate::visibility::VisibilityTracker;

/// Upper bound on scheduler passes per `advance` call.
const MAX_ADVANCE_ROUNDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Reconciliation from the host; never notified back.
    Host,
    Map,
}

#[derive(Debug)]
struct HoverPair {
    primary: HoverArbiter,
    aggregate: HoverArbiter,
}

impl HoverPair {
    fn get(&self, kind: AreaKind) -> &HoverArbiter {
        match kind {
            AreaKind::Primary => &self.primary,
            AreaKind::Aggregate => &self.aggregate,
        }
    }

    fn get_mut(&mut self, kind: AreaKind) -> &mut HoverArbiter {
        match kind {
            AreaKind::Primary => &mut self.primary,
            AreaKind::Aggregate => &mut self.aggregate,
        }
    }
}

pub struct MapOrchestrator<R, G, S, H> {
    config: InteractionConfig,
    engine: R,
    loader: G,
    stats: S,
    host: H,

    selection: SelectionStore,
    hover: HoverPair,
    dragging: bool,
    boundary_mode: AreaKind,

    chunks: ChunkIndex,
    viewport: Option<Bounds>,
    zoom: Option<f64>,
    chunk_requests: GenerationCounter,
    pending_viewport_chunks: Option<Generation>,
    pending_id_chunks: Option<Generation>,

    raw: RawStatTable,
    scoped: Arc<ScopedStatTable>,
    scope: ScopeSet,
    scope_requests: GenerationCounter,
    legend_mode: LegendRangeMode,
    selected_stat: Option<StatisticId>,
    loading: bool,
    refreshed_at: Option<DateTime<Utc>>,
    visibility: VisibilityTracker,

    descriptors: BTreeMap<StatisticId, StatDescriptor>,
    points: Vec<PointOfInterest>,
    category_filter: Option<String>,
    markers_visible: bool,
    markers: MarkerPlan,

    scheduler: TaskScheduler,
    refresh: RefreshQueue,
}

impl<R, G, S, H> MapOrchestrator<R, G, S, H>
where
    R: RenderEngine,
    G: GeometryLoader,
    S: StatsStore,
    H: MapHost,
{
    pub fn new(config: InteractionConfig, engine: R, loader: G, stats: S, host: H) -> Self {
        let config = config.sanitized();
        Self {
            hover: HoverPair {
                primary: HoverArbiter::new(AreaKind::Primary, &config),
                aggregate: HoverArbiter::new(AreaKind::Aggregate, &config),
            },
            config,
            engine,
            loader,
            stats,
            host,
            selection: SelectionStore::default(),
            dragging: false,
            boundary_mode: AreaKind::Primary,
            chunks: ChunkIndex::default(),
            viewport: None,
            zoom: None,
            chunk_requests: GenerationCounter::default(),
            pending_viewport_chunks: None,
            pending_id_chunks: None,
            raw: RawStatTable::new(),
            scoped: Arc::new(ScopedStatTable::default()),
            scope: ScopeSet::default(),
            scope_requests: GenerationCounter::default(),
            legend_mode: LegendRangeMode::default(),
            selected_stat: None,
            loading: false,
            refreshed_at: None,
            visibility: VisibilityTracker::default(),
            descriptors: BTreeMap::new(),
            points: Vec::new(),
            category_filter: None,
            markers_visible: true,
            markers: MarkerPlan::default(),
            scheduler: TaskScheduler::new(),
            refresh: RefreshQueue::default(),
        }
    }

    // ── Inbound: host commands ──────────────────────────────────

    pub fn handle_command(&mut self, now: f64, command: HostCommand) {
        match command {
            HostCommand::SetPinnedIds { kind, ids } => {
                if self.selection.get_mut(kind).set_pinned(ids.into_iter().collect()) {
                    self.selection_changed(kind, Origin::Host, now);
                }
            }
            HostCommand::SetHoveredId { kind, id } => {
                let outcome = self
                    .hover
                    .get_mut(kind)
                    .external_command(id, now, &mut self.scheduler);
                self.apply_hover(kind, outcome);
            }
            HostCommand::ClearTransientSelection { kind } => {
                let kinds = match kind {
                    Some(kind) => vec![kind],
                    None => AreaKind::ALL.to_vec(),
                };
                for kind in kinds {
                    if self.selection.get_mut(kind).clear_transient() {
                        self.selection_changed(kind, Origin::Host, now);
                    }
                }
            }
            HostCommand::AddTransientIds { kind, ids } => {
                if self.selection.get_mut(kind).add_transient(&ids) {
                    self.selection_changed(kind, Origin::Host, now);
                }
            }
            HostCommand::SetBoundaryMode { kind } => {
                self.switch_boundary_mode(kind, Origin::Host, now);
            }
            HostCommand::SetSelectedStat { stat_id } => {
                self.select_stat(stat_id, Origin::Host, now);
            }
            HostCommand::SetLegendRangeMode { mode } => {
                if self.legend_mode != mode {
                    self.legend_mode = mode;
                    self.request(RefreshReason::Visibility, now);
                    self.request(RefreshReason::Aggregate, now);
                }
            }
            HostCommand::SetMarkersVisible { visible } => {
                if self.markers_visible != visible {
                    self.markers_visible = visible;
                    self.request(RefreshReason::Markers, now);
                }
            }
            HostCommand::SetPointsOfInterest { points } => {
                if self.points != points {
                    self.points = points;
                    self.request(RefreshReason::Markers, now);
                }
            }
            HostCommand::SetCategoryFilter { category } => {
                if self.category_filter != category {
                    self.category_filter = category;
                    self.request(RefreshReason::Markers, now);
                }
            }
            HostCommand::SetStatDescriptors { descriptors } => {
                let descriptors: BTreeMap<StatisticId, StatDescriptor> = descriptors
                    .into_iter()
                    .map(|d| (d.id.clone(), d))
                    .collect();
                if self.descriptors != descriptors {
                    self.descriptors = descriptors;
                    self.request(RefreshReason::Markers, now);
                }
            }
        }
    }

    // ── Inbound: map interaction ────────────────────────────────

    pub fn handle_event(&mut self, now: f64, event: MapEvent) {
        match event {
            MapEvent::PointerMove { kind, id } => {
                let outcome = self
                    .hover
                    .get_mut(kind)
                    .pointer_move(id, now, &mut self.scheduler);
                self.apply_hover(kind, outcome);
            }
            MapEvent::PointerLeave { kind } => {
                let outcome = self
                    .hover
                    .get_mut(kind)
                    .pointer_leave(now, &mut self.scheduler);
                self.apply_hover(kind, outcome);
            }
            MapEvent::Click { kind, id, additive } => {
                if self.selection.get_mut(kind).apply_toggle(&id, additive) {
                    self.selection_changed(kind, Origin::Map, now);
                }
            }
            MapEvent::BoxSelect { kind, ids } => {
                if self.selection.get_mut(kind).add_transient(&ids) {
                    self.selection_changed(kind, Origin::Map, now);
                }
            }
            MapEvent::DragStart => self.dragging = true,
            MapEvent::DragEnd => {
                self.dragging = false;
                for kind in AreaKind::ALL {
                    if let Some(id) = self.hover.get_mut(kind).flush_queued(now) {
                        self.host.on_area_hover_change(kind, id.as_ref());
                    }
                }
            }
            MapEvent::BadgeHover { kind, id } => {
                let outcome =
                    self.hover
                        .get_mut(kind)
                        .badge_hover(id, now, self.dragging, &mut self.scheduler);
                self.apply_hover(kind, outcome);
            }
            MapEvent::Escape => {
                for kind in AreaKind::ALL {
                    if self.selection.get_mut(kind).clear_transient() {
                        self.selection_changed(kind, Origin::Map, now);
                    }
                }
            }
            MapEvent::CameraSettled { bounds, zoom } => self.camera_settled(bounds, zoom, now),
            MapEvent::PickBoundaryMode { kind } => {
                self.switch_boundary_mode(kind, Origin::Map, now);
            }
            MapEvent::PickStat { stat_id } => self.select_stat(stat_id, Origin::Map, now),
        }
    }

    // ── Inbound: timers ─────────────────────────────────────────

    /// Fire every task due at `now`. Returns how many ran.
    pub fn advance(&mut self, now: f64) -> usize {
        let mut fired = 0;
        for _ in 0..MAX_ADVANCE_ROUNDS {
            let due = self.scheduler.take_due(now);
            if due.is_empty() {
                break;
            }
            for task in due {
                fired += 1;
                self.run_task(task, now);
            }
        }
        fired
    }

    fn run_task(&mut self, task: TaskId, now: f64) {
        trace!(?task, now, "task fired");
        match task {
            TaskId::HoverDwell(kind) => {
                let outcome = self.hover.get_mut(kind).dwell_expired(
                    now,
                    self.dragging,
                    &mut self.scheduler,
                );
                self.apply_hover(kind, outcome);
            }
            TaskId::HoverLeave(kind) => {
                let outcome = self.hover.get_mut(kind).leave_expired(
                    now,
                    self.dragging,
                    &mut self.scheduler,
                );
                self.apply_hover(kind, outcome);
            }
            TaskId::PreviewDecay(kind) => {
                let outcome = self.hover.get_mut(kind).preview_decay_expired();
                self.apply_hover(kind, outcome);
            }
            TaskId::Refresh => self.run_refresh(),
        }
    }

    // ── Inbound: collaborator responses ─────────────────────────

    /// Apply a statistics update. Returns `false` if it answered an outdated scope.
    pub fn on_stats_update(&mut self, now: f64, update: StatsUpdate) -> bool {
        let generation = Generation(update.generation);
        if !self.scope_requests.is_current(generation) {
            debug!(
                got = update.generation,
                latest = self.scope_requests.latest().0,
                "dropping stale statistics update"
            );
            return false;
        }
        self.raw = update.table;
        self.loading = update.refreshing;
        self.refreshed_at = Some(update.refreshed_at);
        self.request(RefreshReason::Aggregate, now);
        true
    }

    /// Apply loaded chunk summaries. Only the latest viewport request and the
    /// latest explicit-id request are honored.
    pub fn on_chunks_loaded(
        &mut self,
        now: f64,
        generation: Generation,
        chunks: Vec<ChunkSummary>,
    ) -> bool {
        let current = self.pending_viewport_chunks == Some(generation)
            || self.pending_id_chunks == Some(generation);
        if !current {
            debug!(got = generation.0, "dropping stale chunk response");
            return false;
        }
        let stored = self.chunks.apply_loaded(chunks);
        trace!(stored, generation = generation.0, "chunks loaded");
        self.request(RefreshReason::Scope, now);
        true
    }

    // ── Selection ───────────────────────────────────────────────

    fn selection_changed(&mut self, kind: AreaKind, origin: Origin, now: f64) {
        let state = self.selection.get(kind);
        let effective = state.effective();
        let pinned: Vec<AreaId> = state.pinned().iter().cloned().collect();
        let transient: Vec<AreaId> = state.transient().iter().cloned().collect();

        swallow(
            "set_highlight",
            self.engine
                .set_highlight(HighlightLayer::Selected, kind, &effective),
        );
        self.request_missing_geometry(kind, &effective);
        if self.config.fly_to_selection
            && let Some(bounds) = self.chunks.bounds_of(kind, &effective)
        {
            swallow("fit_camera", self.engine.fit_camera(bounds));
        }
        self.request(RefreshReason::Scope, now);

        if origin == Origin::Map {
            let selected: Vec<AreaId> = effective.into_iter().collect();
            self.host
                .on_area_selection_change(kind, &selected, &pinned, &transient);
        }
    }

    fn request_missing_geometry(&mut self, kind: AreaKind, ids: &AreaIdSet) {
        let missing: Vec<AreaId> = ids
            .iter()
            .filter(|id| !self.chunks.contains(kind, id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return;
        }
        let generation = self.chunk_requests.issue();
        self.pending_id_chunks = Some(generation);
        self.loader.ensure_ids(kind, &missing, generation);
    }

    fn switch_boundary_mode(&mut self, kind: AreaKind, origin: Origin, now: f64) {
        if self.boundary_mode == kind {
            return;
        }
        let previous = std::mem::replace(&mut self.boundary_mode, kind);
        info!(from = %previous, to = %kind, "boundary mode switched");

        let outcome = self
            .hover
            .get_mut(previous)
            .reset_map(now, self.dragging, &mut self.scheduler);
        self.apply_hover(previous, outcome);
        if origin == Origin::Map {
            self.host.on_boundary_mode_change(kind);
        }
        for kind in AreaKind::ALL {
            if self.selection.get_mut(kind).clear_transient() {
                self.selection_changed(kind, origin, now);
            }
        }
        self.request(RefreshReason::Markers, now);
    }

    fn select_stat(&mut self, stat_id: Option<StatisticId>, origin: Origin, now: f64) {
        if self.selected_stat == stat_id {
            return;
        }
        self.selected_stat = stat_id;
        if let Some(id) = &self.selected_stat {
            self.stats.prioritize(std::slice::from_ref(id));
        }
        self.request(RefreshReason::Paint, now);
        self.request(RefreshReason::Markers, now);
        if origin == Origin::Map {
            self.host
                .on_stat_selection_change(self.selected_stat.as_deref());
        }
    }

    // ── Hover ───────────────────────────────────────────────────

    fn apply_hover(&mut self, kind: AreaKind, outcome: HoverOutcome) {
        if outcome.repaint {
            self.paint_hover(kind);
            self.paint_linked_labels();
        }
        if let Some(id) = outcome.forward {
            self.host.on_area_hover_change(kind, id.as_ref());
        }
    }

    fn paint_hover(&mut self, kind: AreaKind) {
        let state = self.hover.get(kind).state();
        let committed: AreaIdSet = state.authoritative().into_iter().cloned().collect();
        let preview: AreaIdSet = state.preview_overlay().into_iter().cloned().collect();
        let trailing: AreaIdSet = state.map_preview_trailing.iter().cloned().collect();

        for (layer, ids) in [
            (HighlightLayer::Hover, committed),
            (HighlightLayer::Preview, preview),
            (HighlightLayer::Trailing, trailing),
        ] {
            swallow("set_highlight", self.engine.set_highlight(layer, kind, &ids));
        }
    }

    /// The hovered marker's opposite extremum lights up in the other kind's label layer.
    fn paint_linked_labels(&mut self) {
        for kind in AreaKind::ALL {
            let source = kind.other();
            let partners: AreaIdSet = self
                .hover
                .get(source)
                .state()
                .visual()
                .map(|visual| self.markers.linked_partners(source, &visual.id))
                .unwrap_or_default()
                .into_iter()
                .collect();
            swallow(
                "set_highlight",
                self.engine
                    .set_highlight(HighlightLayer::LinkedLabel, kind, &partners),
            );
        }
    }

    // ── Camera & refresh pipeline ───────────────────────────────

    fn camera_settled(&mut self, bounds: Bounds, zoom: f64, now: f64) {
        if !bounds.is_valid() || !zoom.is_finite() {
            debug!(?bounds, zoom, "ignoring camera settle with unusable bounds");
            return;
        }
        let zoom_changed = self.zoom != Some(zoom);
        self.viewport = Some(bounds);
        self.zoom = Some(zoom);

        let generation = self.chunk_requests.issue();
        self.pending_viewport_chunks = Some(generation);
        self.loader.ensure_viewport(bounds, generation);

        self.request(RefreshReason::Viewport, now);
        self.request(RefreshReason::Visibility, now);
        self.request(RefreshReason::Scope, now);
        if zoom_changed {
            self.request(RefreshReason::Markers, now);
        }
    }

    fn request(&mut self, reason: RefreshReason, now: f64) {
        self.refresh.request(
            reason,
            &mut self.scheduler,
            now,
            self.config.refresh_frame_ms,
        );
    }

    fn run_refresh(&mut self) {
        let mut reasons = self.refresh.take();
        if reasons.is_empty() {
            return;
        }
        trace!(?reasons, "refresh");

        if (reasons.contains(&RefreshReason::Visibility)
            || reasons.contains(&RefreshReason::Viewport))
            && self
                .visibility
                .probe(&self.engine, self.config.canvas_rect())
            && self.legend_mode == LegendRangeMode::Dynamic
        {
            reasons.insert(RefreshReason::Aggregate);
        }
        if reasons.contains(&RefreshReason::Scope) && self.refresh_scope() {
            reasons.insert(RefreshReason::Aggregate);
        }
        if reasons.contains(&RefreshReason::Aggregate) {
            self.rebuild_scoped_table();
            reasons.insert(RefreshReason::Paint);
            reasons.insert(RefreshReason::Markers);
        }
        if reasons.contains(&RefreshReason::Paint) {
            self.paint_fills();
        }
        if reasons.contains(&RefreshReason::Markers) {
            self.replan_markers();
        }
        if reasons.contains(&RefreshReason::Viewport) {
            self.prune_geometry();
        }
    }

    fn refresh_scope(&mut self) -> bool {
        let next = resolve_scope_set(
            &self.selection,
            &self.chunks,
            self.viewport.as_ref(),
            self.scope.active.as_deref(),
            ScopeTunables::from(&self.config),
        );
        if next == self.scope {
            return false;
        }
        info!(active = ?next.active, neighbors = ?next.neighbors, "statistics scope changed");
        self.scope = next;
        let generation = self.scope_requests.issue();
        self.loading = true;
        self.stats.set_scope(&self.scope.names(), generation);
        true
    }

    fn rebuild_scoped_table(&mut self) {
        let table = aggregate(&AggregationInput {
            raw: &self.raw,
            mode: self.legend_mode,
            scope: &self.scope,
            visible: self.visibility.visible(),
        });
        self.scoped = Arc::new(table);
    }

    fn paint_fills(&mut self) {
        for kind in AreaKind::ALL {
            let paint = self
                .selected_stat
                .as_deref()
                .and_then(|stat| {
                    let entry = self.scoped.entry(stat, kind)?;
                    let range = self.scoped.legend_range(stat, kind)?;
                    Some(FillPaint::from_entry(entry, range))
                })
                .unwrap_or_default();
            swallow("set_fill_paint", self.engine.set_fill_paint(kind, &paint));
        }
    }

    fn active_kind_hidden(&self) -> bool {
        self.boundary_mode == AreaKind::Primary
            && self
                .zoom
                .is_some_and(|zoom| zoom < self.config.primary_min_zoom)
    }

    fn replan_markers(&mut self) {
        let plan = plan_markers(&PlanInput {
            table: self.scoped.as_ref(),
            stat_id: self.selected_stat.as_deref(),
            descriptors: &self.descriptors,
            points: &self.points,
            category_filter: self.category_filter.as_deref(),
            markers_visible: self.markers_visible,
            active_kind_hidden: self.active_kind_hidden(),
        });
        swallow("set_markers", self.engine.set_markers(&plan.markers));
        self.markers = plan;
        self.paint_linked_labels();
    }

    /// Keep primary geometry that is in view, selected or hovered; drop the rest.
    /// Aggregate geometry is never pruned, so the loader is told to keep all of it.
    fn prune_geometry(&mut self) {
        let kind = AreaKind::Primary;
        let mut keep = self.visibility.visible().clone();
        if let Some(viewport) = &self.viewport {
            keep.extend(self.chunks.ids_within(kind, viewport));
        }
        keep.extend(self.selection.get(kind).effective());
        let hover = self.hover.get(kind);
        keep.extend(hover.authoritative().cloned());
        keep.extend(hover.state().preview_overlay().cloned());

        let removed = self.chunks.prune_except(kind, &keep);
        if removed > 0 {
            debug!(removed, kept = keep.len(), "pruned primary chunks");
        }
        self.loader.prune_except(kind, &keep);

        let aggregates: AreaIdSet = self
            .chunks
            .iter(AreaKind::Aggregate)
            .map(|c| c.id.clone())
            .collect();
        self.loader.prune_except(AreaKind::Aggregate, &aggregates);
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn selection(&self, kind: AreaKind) -> &SelectionState {
        self.selection.get(kind)
    }

    pub fn hover(&self, kind: AreaKind) -> &HoverArbiter {
        self.hover.get(kind)
    }

    pub fn hovered_id(&self, kind: AreaKind) -> Option<&AreaId> {
        self.hover.get(kind).authoritative()
    }

    pub fn boundary_mode(&self) -> AreaKind {
        self.boundary_mode
    }

    pub fn selected_stat(&self) -> Option<&str> {
        self.selected_stat.as_deref()
    }

    pub fn legend_mode(&self) -> LegendRangeMode {
        self.legend_mode
    }

    /// Cheap handle on the current table; it is replaced, never mutated.
    pub fn scoped_table(&self) -> Arc<ScopedStatTable> {
        Arc::clone(&self.scoped)
    }

    /// Legend range of the selected statistic for `kind`.
    pub fn legend_range(&self, kind: AreaKind) -> Option<LegendRange> {
        self.selected_stat
            .as_deref()
            .and_then(|stat| self.scoped.legend_range(stat, kind))
    }

    pub fn marker_plan(&self) -> &MarkerPlan {
        &self.markers
    }

    pub fn visible_ids(&self) -> &AreaIdSet {
        self.visibility.visible()
    }

    pub fn active_scope(&self) -> Option<&str> {
        self.scope.active.as_deref()
    }

    pub fn scope_set(&self) -> &ScopeSet {
        &self.scope
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn chunks(&self) -> &ChunkIndex {
        &self.chunks
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.scheduler.next_deadline()
    }

    pub fn engine(&self) -> &R {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut R {
        &mut self.engine
    }

    pub fn loader(&self) -> &G {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut G {
        &mut self.loader
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut S {
        &mut self.stats
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        Journal, RecordingEngine, RecordingHost, RecordingLoader, RecordingStats, ids,
    };
    use areamap_shared::{KindEntries, MapNotification, StatEntry, ValueType};

    type TestMap = MapOrchestrator<RecordingEngine, RecordingLoader, RecordingStats, RecordingHost>;

    fn orchestrator(config: InteractionConfig) -> TestMap {
        let journal = Journal::default();
        MapOrchestrator::new(
            config,
            RecordingEngine {
                journal: journal.clone(),
                ..RecordingEngine::default()
            },
            RecordingLoader::default(),
            RecordingStats::default(),
            RecordingHost {
                journal,
                ..RecordingHost::default()
            },
        )
    }

    fn id(raw: &str) -> AreaId {
        AreaId::from(raw)
    }

    fn chunk(kind: AreaKind, raw: &str, bounds: Bounds, scope: Option<&str>) -> ChunkSummary {
        ChunkSummary {
            id: id(raw),
            kind,
            bounds,
            scope: scope.map(str::to_string),
            neighbors: Vec::new(),
        }
    }

    fn sample_chunks() -> Vec<ChunkSummary> {
        vec![
            chunk(AreaKind::Aggregate, "travis", Bounds::new(0.0, 0.0, 10.0, 10.0), None),
            chunk(AreaKind::Aggregate, "hays", Bounds::new(10.0, 0.0, 20.0, 10.0), None),
            chunk(AreaKind::Primary, "a", Bounds::new(1.0, 1.0, 2.0, 2.0), Some("travis")),
            chunk(AreaKind::Primary, "b", Bounds::new(3.0, 3.0, 4.0, 4.0), Some("travis")),
            chunk(AreaKind::Primary, "c", Bounds::new(11.0, 1.0, 12.0, 2.0), Some("hays")),
        ]
    }

    fn stat_entry(values: &[(&str, f64)]) -> StatEntry {
        StatEntry::new(ValueType::Number, values.iter().map(|(k, v)| (id(k), *v)))
    }

    fn sample_table() -> RawStatTable {
        let mut raw = RawStatTable::new();
        let scopes = raw.entry("income".to_string()).or_default();
        scopes.insert(
            "travis".to_string(),
            KindEntries {
                primary: Some(stat_entry(&[("a", 10.0), ("b", 100.0)])),
                aggregate: Some(stat_entry(&[("travis", 5.0)])),
            },
        );
        scopes.insert(
            "hays".to_string(),
            KindEntries {
                primary: Some(stat_entry(&[("c", 50.0)])),
                aggregate: Some(stat_entry(&[("hays", 7.0)])),
            },
        );
        raw
    }

    fn update(generation: Generation) -> StatsUpdate {
        StatsUpdate {
            generation: generation.0,
            refreshed_at: Utc::now(),
            refreshing: false,
            table: sample_table(),
        }
    }

    /// Camera settled over travis, chunks and statistics loaded, "income" selected. Clock at 40.
    fn loaded(config: InteractionConfig) -> TestMap {
        let mut map = orchestrator(config);
        map.engine_mut().rendered = ids(&["a"]);
        map.handle_event(
            0.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 12.0, 10.0),
                zoom: 10.0,
            },
        );
        let generation = map.loader().viewport_requests[0].1;
        assert!(map.on_chunks_loaded(0.0, generation, sample_chunks()));
        map.advance(16.0);

        let (names, scope_generation) = map.stats().scopes.last().cloned().expect("scope request");
        assert_eq!(names, vec!["travis".to_string(), "hays".to_string()]);
        assert!(map.on_stats_update(20.0, update(scope_generation)));
        map.handle_command(
            20.0,
            HostCommand::SetSelectedStat {
                stat_id: Some("income".to_string()),
            },
        );
        map.advance(40.0);
        map
    }

    fn journal_index(map: &TestMap, entry: &str) -> usize {
        map.host()
            .journal
            .borrow()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing journal entry {entry}"))
    }

    #[test]
    fn click_highlights_before_notifying_host() {
        let mut map = orchestrator(InteractionConfig::default());
        map.handle_event(
            0.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("a"),
                additive: false,
            },
        );
        assert_eq!(
            map.engine().highlight(HighlightLayer::Selected, AreaKind::Primary),
            ids(&["a"])
        );
        assert!(
            journal_index(&map, "highlight Selected primary") < journal_index(&map, "notify selection")
        );
        assert_eq!(
            map.host().notifications,
            vec![MapNotification::AreaSelectionChange {
                kind: AreaKind::Primary,
                selected: vec![id("a")],
                pinned: vec![],
                transient: vec![id("a")],
            }]
        );
        assert_eq!(map.loader().id_requests.len(), 1);
    }

    #[test]
    fn host_pinned_ids_are_not_echoed_and_repeats_are_noops() {
        let mut map = orchestrator(InteractionConfig::default());
        let command = HostCommand::SetPinnedIds {
            kind: AreaKind::Primary,
            ids: vec![id("a"), id("b")],
        };
        map.handle_command(0.0, command.clone());
        assert_eq!(
            map.engine().highlight(HighlightLayer::Selected, AreaKind::Primary),
            ids(&["a", "b"])
        );
        let calls = map.host().journal.borrow().len();
        map.handle_command(1.0, command);
        assert_eq!(map.host().journal.borrow().len(), calls);
        assert!(map.host().notifications.is_empty());
    }

    #[test]
    fn dwell_commit_is_forwarded_once_and_host_echo_ignored() {
        let mut map = orchestrator(InteractionConfig::default());
        let kind = AreaKind::Primary;
        map.handle_event(
            0.0,
            MapEvent::PointerMove {
                kind,
                id: Some(id("42")),
            },
        );
        assert_eq!(map.engine().highlight(HighlightLayer::Preview, kind), ids(&["42"]));
        assert!(map.host().hover_changes().is_empty());

        map.advance(100.0);
        assert_eq!(map.engine().highlight(HighlightLayer::Hover, kind), ids(&["42"]));
        assert!(map.engine().highlight(HighlightLayer::Preview, kind).is_empty());
        assert_eq!(map.host().hover_changes(), vec![(kind, Some(id("42")))]);

        map.handle_command(
            110.0,
            HostCommand::SetHoveredId {
                kind,
                id: Some(id("42")),
            },
        );
        assert_eq!(map.hover(kind).state().external, None);

        map.handle_command(
            120.0,
            HostCommand::SetHoveredId {
                kind,
                id: Some(id("7")),
            },
        );
        assert_eq!(map.hovered_id(kind), Some(&id("7")));
        map.handle_command(130.0, HostCommand::SetHoveredId { kind, id: None });
        assert_eq!(map.hovered_id(kind), Some(&id("42")));
        assert_eq!(map.host().hover_changes().len(), 1);
    }

    #[test]
    fn hover_forward_waits_for_drag_end() {
        let mut map = orchestrator(InteractionConfig::default());
        let kind = AreaKind::Aggregate;
        map.handle_event(0.0, MapEvent::DragStart);
        map.handle_event(
            0.0,
            MapEvent::PointerMove {
                kind,
                id: Some(id("travis")),
            },
        );
        map.advance(100.0);
        assert_eq!(map.hovered_id(kind), Some(&id("travis")));
        assert!(map.host().hover_changes().is_empty());

        map.handle_event(150.0, MapEvent::DragEnd);
        assert_eq!(map.host().hover_changes(), vec![(kind, Some(id("travis")))]);
    }

    #[test]
    fn moving_into_adjacent_polygon_within_grace_does_not_flicker() {
        let mut map = orchestrator(InteractionConfig::default());
        let kind = AreaKind::Primary;
        map.handle_event(0.0, MapEvent::PointerMove { kind, id: Some(id("1")) });
        map.advance(100.0);
        map.handle_event(200.0, MapEvent::PointerLeave { kind });
        map.handle_event(220.0, MapEvent::PointerMove { kind, id: Some(id("2")) });
        map.advance(320.0);
        assert_eq!(
            map.host().hover_changes(),
            vec![(kind, Some(id("1"))), (kind, Some(id("2")))]
        );

        map.handle_event(400.0, MapEvent::PointerLeave { kind });
        map.advance(445.0);
        assert_eq!(map.host().hover_changes().last(), Some(&(kind, None)));
        assert!(map.engine().highlight(HighlightLayer::Hover, kind).is_empty());
    }

    #[test]
    fn crossing_into_new_polygon_previews_before_dwell_commits() {
        let mut map = orchestrator(InteractionConfig::default());
        let kind = AreaKind::Primary;
        map.handle_event(0.0, MapEvent::PointerMove { kind, id: Some(id("1")) });
        map.advance(100.0);
        map.handle_event(150.0, MapEvent::PointerMove { kind, id: Some(id("2")) });

        assert_eq!(map.engine().highlight(HighlightLayer::Hover, kind), ids(&["1"]));
        assert_eq!(map.engine().highlight(HighlightLayer::Preview, kind), ids(&["2"]));
        assert_eq!(map.hovered_id(kind), Some(&id("1")));

        map.advance(250.0);
        assert_eq!(map.engine().highlight(HighlightLayer::Hover, kind), ids(&["2"]));
        assert!(map.engine().highlight(HighlightLayer::Preview, kind).is_empty());
    }

    #[test]
    fn badge_hover_takes_precedence_over_map_preview() {
        let mut map = orchestrator(InteractionConfig::default());
        let kind = AreaKind::Primary;
        map.handle_event(0.0, MapEvent::PointerMove { kind, id: Some(id("1")) });
        map.handle_event(10.0, MapEvent::BadgeHover { kind, id: Some(id("9")) });
        assert_eq!(map.engine().highlight(HighlightLayer::Hover, kind), ids(&["9"]));
        assert!(map.engine().highlight(HighlightLayer::Preview, kind).is_empty());
        assert_eq!(map.host().hover_changes(), vec![(kind, Some(id("9")))]);
    }

    #[test]
    fn scope_resolution_drives_statistics_and_paint() {
        let map = loaded(InteractionConfig::default());
        assert_eq!(map.active_scope(), Some("travis"));
        assert_eq!(map.stats().prioritized, vec![vec!["income".to_string()]]);
        assert_eq!(
            map.legend_range(AreaKind::Primary),
            Some(LegendRange {
                min: 10.0,
                max: 100.0
            })
        );
        let fill = map.engine().fills.get(&AreaKind::Primary).expect("primary fill");
        assert_eq!(fill.colors.len(), 3);
        assert!(!map.is_loading());
        assert!(map.refreshed_at().is_some());
    }

    #[test]
    fn stale_statistics_update_is_dropped() {
        let mut map = loaded(InteractionConfig::default());
        let before = map.scoped_table();
        assert!(!map.on_stats_update(50.0, update(Generation(0))));
        map.advance(100.0);
        assert!(Arc::ptr_eq(&before, &map.scoped_table()));
    }

    #[test]
    fn dynamic_mode_narrows_legend_to_visible_ids() {
        let mut map = loaded(InteractionConfig::default());
        map.handle_command(
            50.0,
            HostCommand::SetLegendRangeMode {
                mode: LegendRangeMode::Dynamic,
            },
        );
        map.advance(70.0);
        assert_eq!(map.visible_ids(), &ids(&["a"]));
        assert_eq!(
            map.legend_range(AreaKind::Primary),
            Some(LegendRange { min: 10.0, max: 10.0 })
        );
        // The colour map still covers off-screen areas.
        assert_eq!(map.engine().fills[&AreaKind::Primary].colors.len(), 3);

        map.engine_mut().rendered = ids(&["a", "b"]);
        map.handle_event(
            80.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 12.0, 10.0),
                zoom: 10.0,
            },
        );
        map.advance(100.0);
        assert_eq!(
            map.legend_range(AreaKind::Primary),
            Some(LegendRange {
                min: 10.0,
                max: 100.0
            })
        );
    }

    #[test]
    fn refresh_requests_coalesce_into_one_frame() {
        let mut map = loaded(InteractionConfig::default());
        let fills = map.engine().fill_calls;
        map.handle_command(
            50.0,
            HostCommand::SetLegendRangeMode {
                mode: LegendRangeMode::Global,
            },
        );
        map.handle_command(51.0, HostCommand::SetMarkersVisible { visible: false });
        map.handle_command(
            52.0,
            HostCommand::SetCategoryFilter {
                category: Some("parks".to_string()),
            },
        );
        assert_eq!(map.next_deadline(), Some(66.0));
        assert_eq!(map.advance(70.0), 1);
        assert_eq!(map.engine().fill_calls, fills + 2);
    }

    #[test]
    fn markers_follow_stat_and_zoom() {
        let mut map = loaded(InteractionConfig::default());
        assert_eq!(map.engine().markers.len(), 4);

        map.handle_event(
            50.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 12.0, 10.0),
                zoom: 4.0,
            },
        );
        map.advance(66.0);
        assert!(map.engine().markers.is_empty());
        assert!(map.marker_plan().is_empty());

        map.handle_event(70.0, MapEvent::PickBoundaryMode { kind: AreaKind::Aggregate });
        map.advance(86.0);
        assert_eq!(map.engine().markers.len(), 4);
    }

    #[test]
    fn hovering_extremum_lights_linked_partner_in_other_kind() {
        let mut map = loaded(InteractionConfig::default());
        map.handle_event(
            100.0,
            MapEvent::PointerMove {
                kind: AreaKind::Primary,
                id: Some(id("b")),
            },
        );
        assert_eq!(
            map.engine()
                .highlight(HighlightLayer::LinkedLabel, AreaKind::Aggregate),
            ids(&["travis"])
        );
        map.handle_event(110.0, MapEvent::PointerLeave { kind: AreaKind::Primary });
        map.advance(200.0);
        assert!(
            map.engine()
                .highlight(HighlightLayer::LinkedLabel, AreaKind::Aggregate)
                .is_empty()
        );
    }

    #[test]
    fn picking_boundary_mode_clears_transient_and_notifies() {
        let mut map = orchestrator(InteractionConfig::default());
        map.handle_event(
            0.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("a"),
                additive: false,
            },
        );
        map.handle_event(10.0, MapEvent::PickBoundaryMode { kind: AreaKind::Aggregate });
        assert_eq!(map.boundary_mode(), AreaKind::Aggregate);
        assert!(map.selection(AreaKind::Primary).is_empty());
        assert_eq!(
            &map.host().notifications[1..],
            &[
                MapNotification::BoundaryModeChange {
                    kind: AreaKind::Aggregate
                },
                MapNotification::AreaSelectionChange {
                    kind: AreaKind::Primary,
                    selected: vec![],
                    pinned: vec![],
                    transient: vec![],
                },
            ]
        );

        let count = map.host().notifications.len();
        map.handle_command(20.0, HostCommand::SetBoundaryMode { kind: AreaKind::Aggregate });
        assert_eq!(map.host().notifications.len(), count);
    }

    #[test]
    fn escape_clears_transient_but_keeps_pinned() {
        let mut map = orchestrator(InteractionConfig::default());
        map.handle_command(
            0.0,
            HostCommand::SetPinnedIds {
                kind: AreaKind::Primary,
                ids: vec![id("p")],
            },
        );
        map.handle_event(
            1.0,
            MapEvent::BoxSelect {
                kind: AreaKind::Primary,
                ids: vec![id("a"), id("b"), id("p")],
            },
        );
        assert_eq!(map.selection(AreaKind::Primary).transient(), &ids(&["a", "b"]));
        map.handle_event(2.0, MapEvent::Escape);
        assert!(map.selection(AreaKind::Primary).transient().is_empty());
        assert_eq!(map.selection(AreaKind::Primary).pinned(), &ids(&["p"]));
        assert_eq!(map.host().selection_changes(), 2);
    }

    #[test]
    fn engine_failures_do_not_block_state_changes() {
        let mut map = orchestrator(InteractionConfig::default());
        map.engine_mut().failing = true;
        map.handle_event(
            0.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("a"),
                additive: true,
            },
        );
        map.handle_event(
            0.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 5.0, 5.0),
                zoom: 10.0,
            },
        );
        map.advance(16.0);
        assert!(map.selection(AreaKind::Primary).is_selected(&id("a")));
        assert_eq!(map.host().selection_changes(), 1);
        assert!(map.visible_ids().is_empty());
    }

    #[test]
    fn stale_chunk_response_is_dropped() {
        let mut map = orchestrator(InteractionConfig::default());
        for zoom in [9.0, 10.0] {
            map.handle_event(
                0.0,
                MapEvent::CameraSettled {
                    bounds: Bounds::new(0.0, 0.0, 12.0, 10.0),
                    zoom,
                },
            );
        }
        let first = map.loader().viewport_requests[0].1;
        let second = map.loader().viewport_requests[1].1;
        assert!(!map.on_chunks_loaded(0.0, first, sample_chunks()));
        assert_eq!(map.chunks().len(AreaKind::Primary), 0);
        assert!(map.on_chunks_loaded(0.0, second, sample_chunks()));
        assert_eq!(map.chunks().len(AreaKind::Primary), 3);
    }

    #[test]
    fn pruning_keeps_selected_geometry_out_of_view() {
        let mut map = loaded(InteractionConfig::default());
        map.handle_event(
            50.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("c"),
                additive: false,
            },
        );
        map.engine_mut().rendered = ids(&["a"]);
        map.handle_event(
            60.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 2.5, 2.5),
                zoom: 12.0,
            },
        );
        map.advance(80.0);
        let chunks = map.chunks();
        assert!(chunks.contains(AreaKind::Primary, &id("a")));
        assert!(chunks.contains(AreaKind::Primary, &id("c")));
        assert!(!chunks.contains(AreaKind::Primary, &id("b")));
        let prunes = &map.loader().prunes;
        assert_eq!(
            prunes[prunes.len() - 2],
            (AreaKind::Primary, ids(&["a", "c"]))
        );
    }

    #[test]
    fn pruning_never_drops_aggregate_geometry() {
        let mut map = loaded(InteractionConfig::default());
        map.handle_event(
            60.0,
            MapEvent::CameraSettled {
                bounds: Bounds::new(0.0, 0.0, 2.5, 2.5),
                zoom: 12.0,
            },
        );
        map.advance(80.0);

        let (kind, keep) = map.loader().prunes.last().cloned().expect("prune sent");
        assert_eq!(kind, AreaKind::Aggregate);
        assert_eq!(keep, ids(&["hays", "travis"]));
        assert_eq!(map.chunks().len(AreaKind::Aggregate), 2);
        assert!(
            map.loader()
                .prunes
                .iter()
                .filter(|(kind, _)| *kind == AreaKind::Primary)
                .all(|(_, keep)| !keep.contains(&id("travis")))
        );
    }

    #[test]
    fn fly_to_selection_fits_camera_to_selected_bounds() {
        let config = InteractionConfig {
            fly_to_selection: true,
            ..InteractionConfig::default()
        };
        let mut map = loaded(config);
        map.handle_event(
            50.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("a"),
                additive: false,
            },
        );
        map.handle_event(
            51.0,
            MapEvent::Click {
                kind: AreaKind::Primary,
                id: id("c"),
                additive: true,
            },
        );
        assert_eq!(
            map.engine().fitted.last(),
            Some(&Bounds::new(1.0, 1.0, 12.0, 2.0))
        );
    }

    #[test]
    fn picking_stat_notifies_host_but_host_stat_does_not() {
        let mut map = orchestrator(InteractionConfig::default());
        map.handle_command(
            0.0,
            HostCommand::SetSelectedStat {
                stat_id: Some("income".to_string()),
            },
        );
        assert!(map.host().notifications.is_empty());
        map.handle_event(1.0, MapEvent::PickStat { stat_id: None });
        assert_eq!(
            map.host().notifications,
            vec![MapNotification::StatSelectionChange { stat_id: None }]
        );
        map.advance(20.0);
        assert!(map.engine().fills.values().all(FillPaint::is_empty));
    }
}
