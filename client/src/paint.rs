use std::collections::BTreeMap;

use areamap_shared::colors::{Rgb, normalize, ramp_color, rgba_css};
use areamap_shared::{AreaId, StatEntry};
use serde_json::{Value, json};

use crate::aggregate::LegendRange;

/// Fill opacity for coloured areas.
pub const FILL_OPACITY: f64 = 0.72;

/// Per-area fill colours for one area kind. Areas without a value are absent
/// and render transparent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillPaint {
    pub colors: BTreeMap<AreaId, Rgb>,
}

impl FillPaint {
    /// Colour every value in `entry` against `range`; values outside the range clamp to the ends.
    pub fn from_entry(entry: &StatEntry, range: LegendRange) -> Self {
        let colors = entry
            .values_by_area
            .iter()
            .filter(|(_, value)| value.is_finite())
            .map(|(id, value)| {
                let t = normalize(*value, range.min, range.max).clamp(0.0, 1.0);
                (id.clone(), ramp_color(t))
            })
            .collect();
        Self { colors }
    }

    pub fn transparent() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color_of(&self, id: &AreaId) -> Option<Rgb> {
        self.colors.get(id).copied()
    }

    /// Map-style `match` expression keyed on the feature id, falling back to transparent.
    pub fn to_expression(&self) -> Value {
        if self.colors.is_empty() {
            return json!("rgba(0,0,0,0)");
        }
        let mut expr = vec![json!("match"), json!(["get", "id"])];
        for (id, color) in &self.colors {
            expr.push(json!(id.as_str()));
            expr.push(json!(rgba_css(*color, FILL_OPACITY)));
        }
        expr.push(json!("rgba(0,0,0,0)"));
        Value::Array(expr)
    }
}
