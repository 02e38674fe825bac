//! In-process stand-ins for the rendering engine, geometry loader and
//! statistics store. Everything answers on the shared simulated clock.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use areamap_client::extrema::Marker;
use areamap_client::paint::FillPaint;
use areamap_client::{
    Generation, GeometryLoader, HighlightLayer, RenderEngine, ScreenRect, StatsStore,
};
use areamap_shared::{
    AreaId, AreaIdSet, AreaKind, Bounds, ChunkSummary, RawStatTable, StatisticId, StatsUpdate,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

/// Current simulated time in ms, shared by every collaborator.
pub type SimClock = Rc<Cell<f64>>;

const GRID_COLS: usize = 32;
const GRID_ROWS: usize = 32;

const MIN_SCALE: f64 = 1e-3;
const MAX_SCALE: f64 = 1e4;
const FIT_PADDING: f64 = 0.05;
/// Zoom level reported when one map unit spans one pixel.
const ZOOM_AT_UNIT_SCALE: f64 = 4.0;

/// Pan/zoom transform from map coordinates to canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Viewport {
    pub fn world_to_screen(&self, wx: f64, wy: f64) -> (f64, f64) {
        (
            wx * self.scale + self.offset_x,
            wy * self.scale + self.offset_y,
        )
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
        (
            (sx - self.offset_x) / self.scale,
            (sy - self.offset_y) / self.scale,
        )
    }

    /// Map-space box covered by a pixel rectangle.
    pub fn screen_rect_to_world(&self, rect: ScreenRect) -> Bounds {
        let (x0, y0) = self.screen_to_world(rect.x, rect.y);
        let (x1, y1) = self.screen_to_world(rect.x + rect.width, rect.y + rect.height);
        Bounds::new(x0, y0, x1, y1)
    }

    pub fn zoom(&self) -> f64 {
        ZOOM_AT_UNIT_SCALE + self.scale.log2()
    }

    /// Center `bounds` on the canvas with a small margin. Degenerate input is ignored.
    pub fn fit_bounds(&mut self, bounds: &Bounds, canvas_w: f64, canvas_h: f64) -> bool {
        let world_w = bounds.width();
        let world_h = bounds.height();
        if world_w <= 0.0 || world_h <= 0.0 || canvas_w <= 0.0 || canvas_h <= 0.0 {
            return false;
        }

        let scale_x = canvas_w / (world_w * (1.0 + FIT_PADDING * 2.0));
        let scale_y = canvas_h / (world_h * (1.0 + FIT_PADDING * 2.0));
        self.scale = scale_x.min(scale_y).clamp(MIN_SCALE, MAX_SCALE);

        let (center_x, center_y) = bounds.center();
        self.offset_x = canvas_w / 2.0 - center_x * self.scale;
        self.offset_y = canvas_h / 2.0 - center_y * self.scale;
        true
    }
}

/// Flat grid over map space for point and box hit-testing of one area kind.
#[derive(Debug, Clone)]
pub struct AreaGrid {
    cells: Vec<Vec<usize>>,
    ids: Vec<AreaId>,
    bounds: Vec<Bounds>,
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
}

impl AreaGrid {
    pub fn build<'a>(chunks: impl IntoIterator<Item = &'a ChunkSummary>) -> Self {
        let mut entries: Vec<(&AreaId, Bounds)> =
            chunks.into_iter().map(|c| (&c.id, c.bounds)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let Some(world) = Bounds::union_all(entries.iter().map(|(_, b)| b)) else {
            return Self {
                cells: Vec::new(),
                ids: Vec::new(),
                bounds: Vec::new(),
                min_x: 0.0,
                min_y: 0.0,
                cell_w: 1.0,
                cell_h: 1.0,
            };
        };
        let world = world.expanded(1.0);
        let cell_w = world.width() / GRID_COLS as f64;
        let cell_h = world.height() / GRID_ROWS as f64;

        let mut grid = Self {
            cells: vec![Vec::new(); GRID_COLS * GRID_ROWS],
            ids: Vec::with_capacity(entries.len()),
            bounds: Vec::with_capacity(entries.len()),
            min_x: world.min_x,
            min_y: world.min_y,
            cell_w,
            cell_h,
        };
        for (idx, (id, b)) in entries.into_iter().enumerate() {
            grid.ids.push(id.clone());
            grid.bounds.push(b);
            let (cols, rows) = grid.span(&b);
            for row in rows {
                for col in cols.clone() {
                    grid.cells[row * GRID_COLS + col].push(idx);
                }
            }
        }
        grid
    }

    fn span(&self, b: &Bounds) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let col_start = ((b.min_x - self.min_x) / self.cell_w).floor().max(0.0) as usize;
        let col_end = ((b.max_x - self.min_x) / self.cell_w)
            .floor()
            .clamp(0.0, (GRID_COLS - 1) as f64) as usize;
        let row_start = ((b.min_y - self.min_y) / self.cell_h).floor().max(0.0) as usize;
        let row_end = ((b.max_y - self.min_y) / self.cell_h)
            .floor()
            .clamp(0.0, (GRID_ROWS - 1) as f64) as usize;
        (col_start..col_end + 1, row_start..row_end + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Smallest id whose box contains the point.
    pub fn find_at(&self, wx: f64, wy: f64) -> Option<&AreaId> {
        if self.cells.is_empty() {
            return None;
        }
        let col = ((wx - self.min_x) / self.cell_w).floor() as isize;
        let row = ((wy - self.min_y) / self.cell_h).floor() as isize;
        if col < 0 || row < 0 || col >= GRID_COLS as isize || row >= GRID_ROWS as isize {
            return None;
        }
        self.cells[row as usize * GRID_COLS + col as usize]
            .iter()
            .find(|&&idx| self.bounds[idx].contains_point(wx, wy))
            .map(|&idx| &self.ids[idx])
    }

    /// Every id whose box intersects `area`.
    pub fn query(&self, area: &Bounds) -> AreaIdSet {
        if self.cells.is_empty() || !area.is_valid() {
            return AreaIdSet::new();
        }
        let (cols, rows) = self.span(area);
        let mut out = AreaIdSet::new();
        for row in rows {
            for col in cols.clone() {
                for &idx in &self.cells[row * GRID_COLS + col] {
                    if self.bounds[idx].intersects(area) {
                        out.insert(self.ids[idx].clone());
                    }
                }
            }
        }
        out
    }
}

/// Rendering engine that keeps the last value of every layer instead of drawing.
#[derive(Debug)]
pub struct SimEngine {
    primary: AreaGrid,
    aggregate: AreaGrid,
    viewport: Viewport,
    canvas_w: f64,
    canvas_h: f64,
    highlights: BTreeMap<(HighlightLayer, AreaKind), AreaIdSet>,
    fills: BTreeMap<AreaKind, FillPaint>,
    markers: Vec<Marker>,
    /// Camera moved on request and the map has not been told yet.
    pending_settle: Option<(Bounds, f64)>,
}

impl SimEngine {
    pub fn new(areas: &[ChunkSummary], canvas_w: f64, canvas_h: f64) -> Self {
        Self {
            primary: AreaGrid::build(areas.iter().filter(|c| c.kind == AreaKind::Primary)),
            aggregate: AreaGrid::build(areas.iter().filter(|c| c.kind == AreaKind::Aggregate)),
            viewport: Viewport::default(),
            canvas_w,
            canvas_h,
            highlights: BTreeMap::new(),
            fills: BTreeMap::new(),
            markers: Vec::new(),
            pending_settle: None,
        }
    }

    fn grid(&self, kind: AreaKind) -> &AreaGrid {
        match kind {
            AreaKind::Primary => &self.primary,
            AreaKind::Aggregate => &self.aggregate,
        }
    }

    /// Point the camera at `bounds`, as a user pan or zoom would.
    pub fn show(&mut self, bounds: &Bounds) {
        self.viewport.fit_bounds(bounds, self.canvas_w, self.canvas_h);
    }

    pub fn hit_test(&self, kind: AreaKind, wx: f64, wy: f64) -> Option<AreaId> {
        self.grid(kind).find_at(wx, wy).cloned()
    }

    pub fn visible_bounds(&self) -> Bounds {
        self.viewport.screen_rect_to_world(ScreenRect {
            x: 0.0,
            y: 0.0,
            width: self.canvas_w,
            height: self.canvas_h,
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn take_pending_settle(&mut self) -> Option<(Bounds, f64)> {
        self.pending_settle.take()
    }

    pub fn highlight(&self, layer: HighlightLayer, kind: AreaKind) -> AreaIdSet {
        self.highlights
            .get(&(layer, kind))
            .cloned()
            .unwrap_or_default()
    }

    pub fn fill(&self, kind: AreaKind) -> Option<&FillPaint> {
        self.fills.get(&kind)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

impl RenderEngine for SimEngine {
    fn set_highlight(
        &mut self,
        layer: HighlightLayer,
        kind: AreaKind,
        ids: &AreaIdSet,
    ) -> Result<(), String> {
        self.highlights.insert((layer, kind), ids.clone());
        Ok(())
    }

    fn set_fill_paint(&mut self, kind: AreaKind, paint: &FillPaint) -> Result<(), String> {
        self.fills.insert(kind, paint.clone());
        Ok(())
    }

    fn set_markers(&mut self, markers: &[Marker]) -> Result<(), String> {
        self.markers = markers.to_vec();
        Ok(())
    }

    fn query_rendered_ids(&self, kind: AreaKind, rect: ScreenRect) -> Result<AreaIdSet, String> {
        let area = self.viewport.screen_rect_to_world(rect);
        Ok(self.grid(kind).query(&area))
    }

    fn fit_camera(&mut self, bounds: Bounds) -> Result<(), String> {
        if !self.viewport.fit_bounds(&bounds, self.canvas_w, self.canvas_h) {
            return Err(format!("cannot fit camera to {bounds:?}"));
        }
        self.pending_settle = Some((self.visible_bounds(), self.viewport.zoom()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PendingChunks {
    ready_at: f64,
    generation: Generation,
    chunks: Vec<ChunkSummary>,
}

/// Geometry loader that serves chunks from the scenario after a fixed latency.
#[derive(Debug)]
pub struct SimLoader {
    areas: Vec<ChunkSummary>,
    latency_ms: f64,
    clock: SimClock,
    pending: VecDeque<PendingChunks>,
    requests: usize,
    /// Ids delivered and not yet pruned, per kind.
    resident: BTreeMap<AreaKind, AreaIdSet>,
}

impl SimLoader {
    pub fn new(areas: Vec<ChunkSummary>, latency_ms: f64, clock: SimClock) -> Self {
        Self {
            areas,
            latency_ms,
            clock,
            pending: VecDeque::new(),
            requests: 0,
            resident: BTreeMap::new(),
        }
    }

    fn enqueue(&mut self, generation: Generation, chunks: Vec<ChunkSummary>) {
        self.requests += 1;
        self.pending.push_back(PendingChunks {
            ready_at: self.clock.get() + self.latency_ms,
            generation,
            chunks,
        });
    }

    /// Responses due by `now`, in request order.
    pub fn take_ready(&mut self, now: f64) -> Vec<(Generation, Vec<ChunkSummary>)> {
        let mut ready = Vec::new();
        while let Some(front) = self.pending.front() {
            if front.ready_at > now {
                break;
            }
            if let Some(p) = self.pending.pop_front() {
                for chunk in &p.chunks {
                    self.resident
                        .entry(chunk.kind)
                        .or_default()
                        .insert(chunk.id.clone());
                }
                ready.push((p.generation, p.chunks));
            }
        }
        ready
    }

    pub fn next_ready(&self) -> Option<f64> {
        self.pending.front().map(|p| p.ready_at)
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn resident(&self, kind: AreaKind) -> AreaIdSet {
        self.resident.get(&kind).cloned().unwrap_or_default()
    }
}

impl GeometryLoader for SimLoader {
    fn ensure_viewport(&mut self, bounds: Bounds, generation: Generation) {
        let chunks: Vec<ChunkSummary> = self
            .areas
            .iter()
            .filter(|c| c.bounds.intersects(&bounds))
            .cloned()
            .collect();
        trace!(generation = generation.0, count = chunks.len(), "viewport chunks requested");
        self.enqueue(generation, chunks);
    }

    fn ensure_ids(&mut self, kind: AreaKind, ids: &[AreaId], generation: Generation) {
        let chunks: Vec<ChunkSummary> = self
            .areas
            .iter()
            .filter(|c| c.kind == kind && ids.contains(&c.id))
            .cloned()
            .collect();
        trace!(generation = generation.0, count = chunks.len(), "id chunks requested");
        self.enqueue(generation, chunks);
    }

    fn prune_except(&mut self, kind: AreaKind, keep: &AreaIdSet) {
        if let Some(resident) = self.resident.get_mut(&kind) {
            let before = resident.len();
            resident.retain(|id| keep.contains(id));
            trace!(%kind, dropped = before - resident.len(), "geometry pruned");
        }
    }
}

/// Statistics store that answers each scope change with the matching slice of the scenario table.
#[derive(Debug)]
pub struct SimStats {
    table: RawStatTable,
    latency_ms: f64,
    clock: SimClock,
    started_at: DateTime<Utc>,
    pending: VecDeque<(f64, StatsUpdate)>,
    prioritized: Vec<StatisticId>,
}

impl SimStats {
    pub fn new(
        table: RawStatTable,
        latency_ms: f64,
        clock: SimClock,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            table,
            latency_ms,
            clock,
            started_at,
            pending: VecDeque::new(),
            prioritized: Vec::new(),
        }
    }

    pub fn take_ready(&mut self, now: f64) -> Vec<StatsUpdate> {
        let mut ready = Vec::new();
        while let Some((at, _)) = self.pending.front() {
            if *at > now {
                break;
            }
            if let Some((_, update)) = self.pending.pop_front() {
                ready.push(update);
            }
        }
        ready
    }

    pub fn next_ready(&self) -> Option<f64> {
        self.pending.front().map(|(at, _)| *at)
    }

    pub fn prioritized(&self) -> &[StatisticId] {
        &self.prioritized
    }
}

impl StatsStore for SimStats {
    fn prioritize(&mut self, stat_ids: &[StatisticId]) {
        debug!(?stat_ids, "statistics prioritized");
        self.prioritized.extend(stat_ids.iter().cloned());
    }

    fn set_scope(&mut self, names: &[String], generation: Generation) {
        let table: RawStatTable = self
            .table
            .iter()
            .map(|(stat, scopes)| {
                let slice = scopes
                    .iter()
                    .filter(|(name, _)| names.contains(name))
                    .map(|(name, entries)| (name.clone(), entries.clone()))
                    .collect();
                (stat.clone(), slice)
            })
            .collect();
        let ready_at = self.clock.get() + self.latency_ms;
        let refreshed_at = self.started_at + Duration::milliseconds(ready_at.round() as i64);
        self.pending.push_back((
            ready_at,
            StatsUpdate {
                generation: generation.0,
                refreshed_at,
                refreshing: false,
                table,
            },
        ));
    }
}
