use std::collections::{BTreeMap, BTreeSet};

use areamap_shared::{AreaId, AreaIdSet, AreaKind, Bounds, ChunkSummary};

/// Margin used when deriving adjacency from bounding boxes, so regions that
/// share an edge with floating-point noise still count as neighbors.
const ADJACENCY_EPSILON: f64 = 1e-9;

/// Loaded geometry chunk summaries, per area kind.
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    primary: BTreeMap<AreaId, ChunkSummary>,
    aggregate: BTreeMap<AreaId, ChunkSummary>,
}

impl ChunkIndex {
    fn map(&self, kind: AreaKind) -> &BTreeMap<AreaId, ChunkSummary> {
        match kind {
            AreaKind::Primary => &self.primary,
            AreaKind::Aggregate => &self.aggregate,
        }
    }

    fn map_mut(&mut self, kind: AreaKind) -> &mut BTreeMap<AreaId, ChunkSummary> {
        match kind {
            AreaKind::Primary => &mut self.primary,
            AreaKind::Aggregate => &mut self.aggregate,
        }
    }

    /// Insert or replace chunks. Chunks with unusable bounds are skipped. Returns how many were stored.
    pub fn apply_loaded(&mut self, chunks: impl IntoIterator<Item = ChunkSummary>) -> usize {
        let mut stored = 0;
        for chunk in chunks {
            if !chunk.bounds.is_valid() {
                continue;
            }
            self.map_mut(chunk.kind).insert(chunk.id.clone(), chunk);
            stored += 1;
        }
        stored
    }

    /// Drop every chunk of `kind` not in `keep`. Returns how many were removed.
    pub fn prune_except(&mut self, kind: AreaKind, keep: &AreaIdSet) -> usize {
        let map = self.map_mut(kind);
        let before = map.len();
        map.retain(|id, _| keep.contains(id));
        before - map.len()
    }

    pub fn get(&self, kind: AreaKind, id: &AreaId) -> Option<&ChunkSummary> {
        self.map(kind).get(id)
    }

    pub fn contains(&self, kind: AreaKind, id: &AreaId) -> bool {
        self.map(kind).contains_key(id)
    }

    pub fn iter(&self, kind: AreaKind) -> impl Iterator<Item = &ChunkSummary> {
        self.map(kind).values()
    }

    pub fn len(&self, kind: AreaKind) -> usize {
        self.map(kind).len()
    }

    /// Bounding box of the given ids. Unknown ids are skipped.
    pub fn bounds_of<'a>(
        &self,
        kind: AreaKind,
        ids: impl IntoIterator<Item = &'a AreaId>,
    ) -> Option<Bounds> {
        let map = self.map(kind);
        let boxes: Vec<Bounds> = ids
            .into_iter()
            .filter_map(|id| map.get(id).map(|c| c.bounds))
            .collect();
        Bounds::union_all(&boxes)
    }

    pub fn scope_of(&self, kind: AreaKind, id: &AreaId) -> Option<&str> {
        self.get(kind, id).and_then(ChunkSummary::scope_name)
    }

    /// Ids of `kind` whose bounds intersect `bounds`.
    pub fn ids_within(&self, kind: AreaKind, bounds: &Bounds) -> AreaIdSet {
        self.map(kind)
            .values()
            .filter(|c| c.bounds.intersects(bounds))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Scope names adjacent to `scope`: explicit neighbor lists plus aggregate
    /// regions whose bounds touch the scope's regions.
    pub fn neighbor_scopes(&self, scope: &str) -> Vec<String> {
        let regions: Vec<&ChunkSummary> = self
            .aggregate
            .values()
            .filter(|c| c.scope_name() == Some(scope))
            .collect();

        let mut out: BTreeSet<String> = regions
            .iter()
            .flat_map(|c| c.neighbors.iter().cloned())
            .collect();
        for other in self.aggregate.values() {
            let Some(other_scope) = other.scope_name() else {
                continue;
            };
            if other_scope == scope {
                continue;
            }
            let touches = regions.iter().any(|region| {
                region
                    .bounds
                    .expanded(ADJACENCY_EPSILON)
                    .intersects(&other.bounds)
            });
            if touches {
                out.insert(other_scope.to_string());
            }
        }
        out.remove(scope);
        out.into_iter().collect()
    }
}
