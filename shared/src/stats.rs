use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::area::{AreaId, AreaKind};

pub type StatisticId = String;

/// How a statistic's values should be read and formatted by legend widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Number,
    Percent,
    Currency,
    Count,
    Rate,
}

/// Whether a high value is good news, bad news, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
    #[default]
    Neutral,
}

/// Which scope set feeds the legend min/max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendRangeMode {
    /// Only primary ids currently rendered in the viewport.
    Dynamic,
    /// The active scope plus its neighbors.
    #[default]
    Scoped,
    /// Every known scope.
    Global,
}

/// Values of one statistic for one boundary kind.
///
/// `min`/`max` are always the finite extrema of `values_by_area` (0/0 when empty).
/// Construct through [`StatEntry::new`] so that invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatEntry {
    pub value_type: ValueType,
    pub values_by_area: BTreeMap<AreaId, f64>,
    pub min: f64,
    pub max: f64,
}

impl StatEntry {
    /// Drops non-finite values and recomputes the extrema from scratch.
    pub fn new(value_type: ValueType, values: impl IntoIterator<Item = (AreaId, f64)>) -> Self {
        let values_by_area: BTreeMap<AreaId, f64> =
            values.into_iter().filter(|(_, v)| v.is_finite()).collect();
        let (min, max) = finite_extrema(values_by_area.values().copied()).unwrap_or((0.0, 0.0));
        Self {
            value_type,
            values_by_area,
            min,
            max,
        }
    }

    pub fn empty(value_type: ValueType) -> Self {
        Self::new(value_type, std::iter::empty())
    }

    pub fn value(&self, id: &AreaId) -> Option<f64> {
        self.values_by_area.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values_by_area.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values_by_area.len()
    }
}

/// Raw wire shape: incoming `min`/`max` are ignored and recomputed, so a
/// stale or hand-edited payload can never break the extrema invariant.
#[derive(Deserialize)]
struct RawStatEntry {
    #[serde(default)]
    value_type: ValueType,
    #[serde(default)]
    values_by_area: BTreeMap<AreaId, Option<f64>>,
}

impl<'de> Deserialize<'de> for StatEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawStatEntry::deserialize(deserializer)?;
        Ok(StatEntry::new(
            raw.value_type,
            raw.values_by_area
                .into_iter()
                .filter_map(|(id, v)| v.map(|v| (id, v))),
        ))
    }
}

/// Finite `(min, max)` of a value stream, or `None` when it has no finite value.
pub fn finite_extrema(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// One statistic's entries, split by boundary kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KindEntries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<StatEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<StatEntry>,
}

impl KindEntries {
    pub fn get(&self, kind: AreaKind) -> Option<&StatEntry> {
        match kind {
            AreaKind::Primary => self.primary.as_ref(),
            AreaKind::Aggregate => self.aggregate.as_ref(),
        }
    }

    pub fn set(&mut self, kind: AreaKind, entry: Option<StatEntry>) {
        match kind {
            AreaKind::Primary => self.primary = entry,
            AreaKind::Aggregate => self.aggregate = entry,
        }
    }
}

/// `statId -> parent scope name -> entries`, as delivered by the statistics store.
pub type RawStatTable = BTreeMap<StatisticId, BTreeMap<String, KindEntries>>;

/// Static metadata for one statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatDescriptor {
    pub id: StatisticId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub polarity: Polarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// An externally supplied marker anchored on an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub kind: AreaKind,
    pub area_id: AreaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_id: Option<StatisticId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Subscription payload from the statistics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
    /// Echo of the scope generation the store was answering.
    pub generation: u64,
    pub refreshed_at: DateTime<Utc>,
    /// The store is still fetching more data for this scope.
    #[serde(default)]
    pub refreshing: bool,
    #[serde(default)]
    pub table: RawStatTable,
}
