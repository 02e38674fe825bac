//! Extremum marker planning for the selected statistic.

use std::collections::BTreeMap;

use areamap_shared::colors::{Rgb, TONE_NEGATIVE, TONE_NEUTRAL, TONE_POSITIVE};
use areamap_shared::{
    AreaId, AreaKind, PointOfInterest, Polarity, StatDescriptor, StatEntry, StatisticId,
};
use serde::Serialize;

use crate::aggregate::ScopedStatTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::High => Direction::Low,
            Direction::Low => Direction::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

impl Tone {
    pub fn rgb(self) -> Rgb {
        match self {
            Tone::Positive => TONE_POSITIVE,
            Tone::Negative => TONE_NEGATIVE,
            Tone::Neutral => TONE_NEUTRAL,
        }
    }
}

/// High markers follow the polarity; low markers take the opposite mapping.
pub fn tone_for(direction: Direction, polarity: Polarity) -> Tone {
    match (direction, polarity) {
        (_, Polarity::Neutral) => Tone::Neutral,
        (Direction::High, Polarity::HigherIsBetter) | (Direction::Low, Polarity::LowerIsBetter) => {
            Tone::Positive
        }
        (Direction::High, Polarity::LowerIsBetter) | (Direction::Low, Polarity::HigherIsBetter) => {
            Tone::Negative
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extremum {
    pub id: AreaId,
    pub value: f64,
}

/// Max and min of `entry`. Ties go to the smallest id.
pub fn find_extrema(entry: &StatEntry) -> Option<(Extremum, Extremum)> {
    let mut high: Option<(&AreaId, f64)> = None;
    let mut low: Option<(&AreaId, f64)> = None;
    // values_by_area iterates in id order, so strict comparisons keep the smallest id.
    for (id, &value) in &entry.values_by_area {
        if !value.is_finite() {
            continue;
        }
        if high.is_none_or(|(_, v)| value > v) {
            high = Some((id, value));
        }
        if low.is_none_or(|(_, v)| value < v) {
            low = Some((id, value));
        }
    }
    let ((hi_id, hi), (lo_id, lo)) = high.zip(low)?;
    Some((
        Extremum {
            id: hi_id.clone(),
            value: hi,
        },
        Extremum {
            id: lo_id.clone(),
            value: lo,
        },
    ))
}

/// One badge on the map. A marker carrying both tones is a combined high+low marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub kind: AreaKind,
    pub area_id: AreaId,
    /// Pairing key shared by the high and low markers of one statistic.
    pub stat_id: StatisticId,
    pub high: Option<Tone>,
    pub low: Option<Tone>,
}

impl Marker {
    pub fn is_combined(&self) -> bool {
        self.high.is_some() && self.low.is_some()
    }

    pub fn has(&self, direction: Direction) -> bool {
        match direction {
            Direction::High => self.high.is_some(),
            Direction::Low => self.low.is_some(),
        }
    }

    /// Tone colours, high first.
    pub fn colors(&self) -> Vec<Rgb> {
        self.high
            .iter()
            .chain(self.low.iter())
            .map(|tone| tone.rgb())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarkerPlan {
    pub markers: Vec<Marker>,
    /// Points of interest that pass the category filter.
    pub points: Vec<PointOfInterest>,
}

impl MarkerPlan {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.points.is_empty()
    }

    pub fn markers_of(&self, kind: AreaKind) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |m| m.kind == kind)
    }

    /// Ids in the other kind's label layer holding the opposite extremum of
    /// the marker(s) on `id`. Combined markers have no partner.
    pub fn linked_partners(&self, kind: AreaKind, id: &AreaId) -> Vec<AreaId> {
        let mut out = Vec::new();
        for hovered in self.markers_of(kind).filter(|m| &m.area_id == id) {
            if hovered.is_combined() {
                continue;
            }
            let direction = if hovered.high.is_some() {
                Direction::High
            } else {
                Direction::Low
            };
            out.extend(
                self.markers_of(kind.other())
                    .filter(|m| m.stat_id == hovered.stat_id && m.has(direction.opposite()))
                    .map(|m| m.area_id.clone()),
            );
        }
        out.sort();
        out.dedup();
        out
    }
}

pub struct PlanInput<'a> {
    pub table: &'a ScopedStatTable,
    pub stat_id: Option<&'a str>,
    pub descriptors: &'a BTreeMap<StatisticId, StatDescriptor>,
    pub points: &'a [PointOfInterest],
    pub category_filter: Option<&'a str>,
    pub markers_visible: bool,
    /// The current boundary mode's geometry is hidden at this zoom.
    pub active_kind_hidden: bool,
}

fn point_applies(point: &PointOfInterest, filter: Option<&str>) -> bool {
    filter.is_none_or(|category| point.category.as_deref() == Some(category))
}

fn anchored_point(points: &[PointOfInterest], kind: AreaKind, id: &AreaId, stat_id: &str) -> bool {
    points
        .iter()
        .any(|p| p.kind == kind && &p.area_id == id && p.stat_id.as_deref() == Some(stat_id))
}

fn plan_kind(
    entry: &StatEntry,
    kind: AreaKind,
    stat_id: &str,
    polarity: Polarity,
    points: &[PointOfInterest],
) -> Vec<Marker> {
    let Some((high, low)) = find_extrema(entry) else {
        return Vec::new();
    };
    let marker = |id: &AreaId, high: Option<Tone>, low: Option<Tone>| Marker {
        kind,
        area_id: id.clone(),
        stat_id: stat_id.to_string(),
        high,
        low,
    };
    let high_tone = tone_for(Direction::High, polarity);
    let low_tone = tone_for(Direction::Low, polarity);

    if high.id == low.id {
        if anchored_point(points, kind, &high.id, stat_id) {
            return Vec::new();
        }
        return vec![marker(&high.id, Some(high_tone), Some(low_tone))];
    }

    let mut out = Vec::with_capacity(2);
    if !anchored_point(points, kind, &high.id, stat_id) {
        out.push(marker(&high.id, Some(high_tone), None));
    }
    if !anchored_point(points, kind, &low.id, stat_id) {
        out.push(marker(&low.id, None, Some(low_tone)));
    }
    out
}

pub fn plan_markers(input: &PlanInput<'_>) -> MarkerPlan {
    if !input.markers_visible || input.active_kind_hidden {
        return MarkerPlan::default();
    }
    let points: Vec<PointOfInterest> = input
        .points
        .iter()
        .filter(|p| point_applies(p, input.category_filter))
        .cloned()
        .collect();

    let Some(stat_id) = input.stat_id else {
        return MarkerPlan {
            markers: Vec::new(),
            points,
        };
    };

    let polarity = input
        .descriptors
        .get(stat_id)
        .map(|d| d.polarity)
        .unwrap_or_default();
    let markers = AreaKind::ALL
        .into_iter()
        .filter_map(|kind| input.table.entry(stat_id, kind).map(|entry| (kind, entry)))
        .flat_map(|(kind, entry)| plan_kind(entry, kind, stat_id, polarity, input.points))
        .collect();
    MarkerPlan { markers, points }
}
