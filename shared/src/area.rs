use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The two granularities of selectable geography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    /// Fine-grained cells (ZIP-like).
    Primary,
    /// Coarser regions (county-like). Their scope names key the statistics tables.
    Aggregate,
}

impl AreaKind {
    pub const ALL: [AreaKind; 2] = [AreaKind::Primary, AreaKind::Aggregate];

    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Aggregate,
            Self::Aggregate => Self::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque area identifier. Only meaningful together with an [`AreaKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AreaId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for AreaId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered so every derived list (notifications, paint, markers) is deterministic.
pub type AreaIdSet = BTreeSet<AreaId>;

/// Axis-aligned bounding box in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Finite and non-inverted. Degenerate (zero-area) boxes are still valid.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bounds {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expanded(&self, margin: f64) -> Bounds {
        Bounds {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Union of every valid box, or `None` when there is none.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        boxes
            .into_iter()
            .filter(|b| b.is_valid())
            .fold(None, |acc: Option<Bounds>, b| {
                Some(acc.map_or(*b, |a| a.union(b)))
            })
    }
}

/// Summary of one loaded geometry chunk, as reported by the chunk loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub id: AreaId,
    pub kind: AreaKind,
    pub bounds: Bounds,
    /// Parent aggregate scope for primary cells; the region's own scope name for aggregates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Explicitly adjacent scope names. Only read for aggregate chunks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<String>,
}

impl ChunkSummary {
    /// Scope name this chunk contributes to. Aggregates fall back to their own id.
    pub fn scope_name(&self) -> Option<&str> {
        match (self.kind, self.scope.as_deref()) {
            (_, Some(scope)) => Some(scope),
            (AreaKind::Aggregate, None) => Some(self.id.as_str()),
            (AreaKind::Primary, None) => None,
        }
    }
}
