//! Scoped statistics aggregation.
//!
//! Raw per-scope tables are merged into one table per statistic and boundary
//! kind covering the scopes relevant to the current legend mode. The primary
//! kind's legend range is computed in a separate pass so it can be narrower
//! than the coloured value map (visible ids only in dynamic mode).

use std::collections::BTreeMap;

use areamap_shared::{
    AreaIdSet, AreaKind, KindEntries, LegendRangeMode, RawStatTable, StatEntry, StatisticId,
    finite_extrema,
};

use crate::scope::ScopeSet;

/// Union of two entries; `incoming` wins on key collisions. Extrema are recomputed from scratch.
pub fn merge_stat_entries(existing: Option<&StatEntry>, incoming: &StatEntry) -> StatEntry {
    let values = existing
        .into_iter()
        .flat_map(|entry| entry.values_by_area.iter())
        .chain(incoming.values_by_area.iter())
        .map(|(id, value)| (id.clone(), *value));
    StatEntry::new(incoming.value_type, values)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendRange {
    pub min: f64,
    pub max: f64,
}

impl LegendRange {
    pub fn of_entry(entry: &StatEntry) -> Option<Self> {
        (!entry.is_empty()).then_some(Self {
            min: entry.min,
            max: entry.max,
        })
    }
}

/// One statistic after aggregation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopedStat {
    /// Merged value maps used for colouring.
    pub entries: KindEntries,
    /// Legend range for the primary kind, computed separately from the merged map.
    pub primary_legend: Option<LegendRange>,
}

impl ScopedStat {
    pub fn legend_range(&self, kind: AreaKind) -> Option<LegendRange> {
        match kind {
            AreaKind::Primary => self.primary_legend,
            AreaKind::Aggregate => self.entries.aggregate.as_ref().and_then(LegendRange::of_entry),
        }
    }
}

/// Derived, read-only view of the statistics relevant to the current scope.
/// Always rebuilt wholesale; never patched in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopedStatTable {
    pub mode: LegendRangeMode,
    pub stats: BTreeMap<StatisticId, ScopedStat>,
}

impl ScopedStatTable {
    pub fn get(&self, stat_id: &str) -> Option<&ScopedStat> {
        self.stats.get(stat_id)
    }

    pub fn entry(&self, stat_id: &str, kind: AreaKind) -> Option<&StatEntry> {
        self.get(stat_id).and_then(|stat| stat.entries.get(kind))
    }

    pub fn legend_range(&self, stat_id: &str, kind: AreaKind) -> Option<LegendRange> {
        self.get(stat_id).and_then(|stat| stat.legend_range(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

pub struct AggregationInput<'a> {
    pub raw: &'a RawStatTable,
    pub mode: LegendRangeMode,
    pub scope: &'a ScopeSet,
    pub visible: &'a AreaIdSet,
}

/// Scope names of one statistic that feed the merge under `mode`.
///
/// Scoped and dynamic modes without any active scope fall back to every
/// scope, so a fresh session still shows data before a scope is known.
pub fn relevant_scope_names<'a>(
    scopes: &'a BTreeMap<String, KindEntries>,
    mode: LegendRangeMode,
    scope: &ScopeSet,
) -> Vec<&'a str> {
    let everything = || scopes.keys().map(String::as_str).collect();
    match mode {
        LegendRangeMode::Global => everything(),
        LegendRangeMode::Scoped | LegendRangeMode::Dynamic => {
            if scope.active.is_none() {
                return everything();
            }
            scopes
                .keys()
                .filter(|name| scope.contains(name))
                .map(String::as_str)
                .collect()
        }
    }
}

fn merge_kind(
    scopes: &BTreeMap<String, KindEntries>,
    names: &[&str],
    kind: AreaKind,
) -> Option<StatEntry> {
    names
        .iter()
        .filter_map(|name| scopes.get(*name).and_then(|entries| entries.get(kind)))
        .fold(None, |acc: Option<StatEntry>, incoming| {
            Some(merge_stat_entries(acc.as_ref(), incoming))
        })
}

fn primary_legend(
    scopes: &BTreeMap<String, KindEntries>,
    names: &[&str],
    mode: LegendRangeMode,
    visible: &AreaIdSet,
) -> Option<LegendRange> {
    let primary_values = move |only_visible: bool| {
        names
            .iter()
            .filter_map(|name| scopes.get(*name).and_then(|e| e.primary.as_ref()))
            .flat_map(|entry| entry.values_by_area.iter())
            .filter(move |(id, _)| !only_visible || visible.contains(*id))
            .map(|(_, value)| *value)
    };
    let to_range = |(min, max): (f64, f64)| LegendRange { min, max };

    if mode == LegendRangeMode::Dynamic && !visible.is_empty() {
        if let Some(range) = finite_extrema(primary_values(true)) {
            return Some(to_range(range));
        }
    }
    finite_extrema(primary_values(false)).map(to_range)
}

/// Build the scoped table for every statistic in `raw`.
pub fn aggregate(input: &AggregationInput<'_>) -> ScopedStatTable {
    let mut stats = BTreeMap::new();
    for (stat_id, scopes) in input.raw {
        let names = relevant_scope_names(scopes, input.mode, input.scope);
        if names.is_empty() {
            continue;
        }
        let mut entries = KindEntries::default();
        for kind in AreaKind::ALL {
            entries.set(kind, merge_kind(scopes, &names, kind));
        }
        let primary_legend = primary_legend(scopes, &names, input.mode, input.visible);
        stats.insert(
            stat_id.clone(),
            ScopedStat {
                entries,
                primary_legend,
            },
        );
    }
    ScopedStatTable {
        mode: input.mode,
        stats,
    }
}
