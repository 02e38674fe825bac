use std::collections::BTreeMap;

use areamap_shared::{AreaKind, Bounds};

use crate::chunks::ChunkIndex;
use crate::config::InteractionConfig;
use crate::selection::SelectionStore;

/// Dominance thresholds for active-scope resolution. Both are product tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeTunables {
    /// Share of selected areas one scope must hold.
    pub selection_plurality: f64,
    /// Share of the viewport area one scope's regions must cover.
    pub viewport_dominance: f64,
}

impl From<&InteractionConfig> for ScopeTunables {
    fn from(config: &InteractionConfig) -> Self {
        Self {
            selection_plurality: config.selection_plurality,
            viewport_dominance: config.viewport_dominance,
        }
    }
}

/// The active scope and its neighbors, i.e. the scope names statistics are merged over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    pub active: Option<String>,
    pub neighbors: Vec<String>,
}

impl ScopeSet {
    /// Active scope first, then neighbors.
    pub fn names(&self) -> Vec<String> {
        self.active
            .iter()
            .chain(self.neighbors.iter())
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.as_deref() == Some(name) || self.neighbors.iter().any(|n| n == name)
    }
}

/// Highest-scoring name, ties going to the lexicographically smallest.
fn best_of(scores: &BTreeMap<String, f64>) -> Option<(&str, f64)> {
    scores
        .iter()
        .fold(None, |best: Option<(&str, f64)>, (name, score)| match best {
            Some((_, top)) if *score <= top => best,
            _ => Some((name.as_str(), *score)),
        })
}

/// Scope holding at least `plurality` of the effective selection (both kinds).
/// Selected ids without known geometry are not counted.
pub fn dominant_scope_by_selection(
    selection: &SelectionStore,
    chunks: &ChunkIndex,
    plurality: f64,
) -> Option<String> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    let mut total = 0.0;
    for kind in AreaKind::ALL {
        for id in selection.get(kind).effective() {
            if let Some(scope) = chunks.scope_of(kind, &id) {
                *counts.entry(scope.to_string()).or_default() += 1.0;
                total += 1.0;
            }
        }
    }
    if total == 0.0 {
        return None;
    }
    best_of(&counts)
        .filter(|(_, count)| count / total >= plurality)
        .map(|(name, _)| name.to_string())
}

/// Scope whose aggregate regions cover at least `dominance` of the viewport area.
pub fn dominant_scope_by_viewport(
    viewport: &Bounds,
    chunks: &ChunkIndex,
    dominance: f64,
) -> Option<String> {
    let viewport_area = viewport.area();
    if !viewport.is_valid() || viewport_area <= 0.0 {
        return None;
    }
    let mut ratios: BTreeMap<String, f64> = BTreeMap::new();
    for region in chunks.iter(AreaKind::Aggregate) {
        let Some(scope) = region.scope_name() else {
            continue;
        };
        if let Some(overlap) = viewport.intersection(&region.bounds) {
            *ratios.entry(scope.to_string()).or_default() += overlap.area() / viewport_area;
        }
    }
    best_of(&ratios)
        .filter(|(_, ratio)| *ratio >= dominance)
        .map(|(name, _)| name.to_string())
}

/// Selection plurality, then viewport dominance, then the last known scope.
pub fn resolve_active_scope(
    selection: &SelectionStore,
    chunks: &ChunkIndex,
    viewport: Option<&Bounds>,
    last: Option<&str>,
    tunables: ScopeTunables,
) -> Option<String> {
    dominant_scope_by_selection(selection, chunks, tunables.selection_plurality)
        .or_else(|| {
            viewport.and_then(|vp| dominant_scope_by_viewport(vp, chunks, tunables.viewport_dominance))
        })
        .or_else(|| last.map(str::to_string))
}

pub fn resolve_scope_set(
    selection: &SelectionStore,
    chunks: &ChunkIndex,
    viewport: Option<&Bounds>,
    last: Option<&str>,
    tunables: ScopeTunables,
) -> ScopeSet {
    let active = resolve_active_scope(selection, chunks, viewport, last, tunables);
    let neighbors = active
        .as_deref()
        .map(|scope| chunks.neighbor_scopes(scope))
        .unwrap_or_default();
    ScopeSet { active, neighbors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use areamap_shared::{AreaId, ChunkSummary};

    const TUNABLES: ScopeTunables = ScopeTunables {
        selection_plurality: 0.5,
        viewport_dominance: 0.45,
    };

    fn chunk(kind: AreaKind, id: &str, bounds: Bounds, scope: Option<&str>) -> ChunkSummary {
        ChunkSummary {
            id: AreaId::from(id),
            kind,
            bounds,
            scope: scope.map(str::to_string),
            neighbors: Vec::new(),
        }
    }

    fn index() -> ChunkIndex {
        let mut index = ChunkIndex::default();
        index.apply_loaded([
            chunk(AreaKind::Aggregate, "travis", Bounds::new(0.0, 0.0, 10.0, 10.0), None),
            chunk(AreaKind::Aggregate, "hays", Bounds::new(10.0, 0.0, 20.0, 10.0), None),
            chunk(AreaKind::Aggregate, "bastrop", Bounds::new(0.0, 10.0, 10.0, 20.0), None),
            chunk(AreaKind::Primary, "t1", Bounds::new(1.0, 1.0, 2.0, 2.0), Some("travis")),
            chunk(AreaKind::Primary, "t2", Bounds::new(3.0, 3.0, 4.0, 4.0), Some("travis")),
            chunk(AreaKind::Primary, "h1", Bounds::new(11.0, 1.0, 12.0, 2.0), Some("hays")),
            chunk(AreaKind::Primary, "h2", Bounds::new(13.0, 1.0, 14.0, 2.0), Some("hays")),
            chunk(AreaKind::Primary, "b1", Bounds::new(1.0, 11.0, 2.0, 12.0), Some("bastrop")),
        ]);
        index
    }

    fn select(store: &mut SelectionStore, kind: AreaKind, raw: &[&str]) {
        let ids: Vec<AreaId> = raw.iter().map(|s| AreaId::from(*s)).collect();
        store.get_mut(kind).add_transient(&ids);
    }

    #[test]
    fn selection_plurality_picks_scope() {
        let mut store = SelectionStore::default();
        select(&mut store, AreaKind::Primary, &["t1", "t2", "h1"]);
        assert_eq!(
            dominant_scope_by_selection(&store, &index(), 0.5),
            Some("travis".to_string())
        );
    }

    #[test]
    fn even_split_resolves_to_smallest_name() {
        let mut store = SelectionStore::default();
        select(&mut store, AreaKind::Primary, &["t1", "h1"]);
        assert_eq!(
            dominant_scope_by_selection(&store, &index(), 0.5),
            Some("hays".to_string())
        );
    }

    #[test]
    fn selection_below_plurality_falls_through_to_viewport() {
        let mut store = SelectionStore::default();
        select(&mut store, AreaKind::Primary, &["t1", "h1", "b1"]);
        let chunks = index();
        assert_eq!(dominant_scope_by_selection(&store, &chunks, 0.5), None);

        let viewport = Bounds::new(9.0, 0.0, 19.0, 10.0);
        assert_eq!(
            resolve_active_scope(&store, &chunks, Some(&viewport), Some("bastrop"), TUNABLES),
            Some("hays".to_string())
        );
    }

    #[test]
    fn aggregate_selection_counts_its_own_scope() {
        let mut store = SelectionStore::default();
        select(&mut store, AreaKind::Aggregate, &["bastrop"]);
        assert_eq!(
            dominant_scope_by_selection(&store, &index(), 0.5),
            Some("bastrop".to_string())
        );
    }

    #[test]
    fn viewport_split_below_dominance_keeps_last_scope() {
        let store = SelectionStore::default();
        let chunks = index();
        // 40% travis, 40% hays, 10% bastrop.
        let wide = Bounds::new(6.0, 0.0, 14.0, 12.5);
        assert_eq!(dominant_scope_by_viewport(&wide, &chunks, 0.45), None);
        assert_eq!(
            resolve_active_scope(&store, &chunks, Some(&wide), Some("travis"), TUNABLES),
            Some("travis".to_string())
        );
        assert_eq!(resolve_active_scope(&store, &chunks, None, None, TUNABLES), None);
    }

    #[test]
    fn scope_set_includes_neighbors() {
        let mut store = SelectionStore::default();
        select(&mut store, AreaKind::Primary, &["t1"]);
        let set = resolve_scope_set(&store, &index(), None, None, TUNABLES);
        assert_eq!(set.active.as_deref(), Some("travis"));
        assert_eq!(set.neighbors, vec!["bastrop".to_string(), "hays".to_string()]);
        assert_eq!(set.names(), vec!["travis", "bastrop", "hays"]);
        assert!(set.contains("hays"));
        assert!(!set.contains("bell"));
    }
}
