use std::path::Path;

use areamap_client::InteractionConfig;
use areamap_shared::{
    AreaKind, ChunkSummary, HostCommand, MapEvent, PointOfInterest, RawStatTable, StatDescriptor,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded session: the world the map sees plus a timeline of inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: InteractionConfig,
    /// Wall-clock time at `at_ms == 0`, used to stamp statistics updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub areas: Vec<ChunkSummary>,
    #[serde(default)]
    pub descriptors: Vec<StatDescriptor>,
    #[serde(default)]
    pub points: Vec<PointOfInterest>,
    #[serde(default)]
    pub stats: RawStatTable,
    #[serde(default)]
    pub timeline: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub at_ms: f64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Command(HostCommand),
    Event(MapEvent),
    /// Raw pointer position in map coordinates, hit-tested against the simulated engine.
    Pointer { kind: AreaKind, x: f64, y: f64 },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::parse(&raw).map_err(|e| format!("{}: {e}", path.display()))
    }

    /// Parse and validate. The timeline comes back ordered by time, ties kept in file order.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut scenario: Scenario =
            serde_json::from_str(raw).map_err(|e| format!("invalid scenario: {e}"))?;
        if scenario.areas.is_empty() {
            return Err("scenario has no areas".to_string());
        }
        if let Some(chunk) = scenario.areas.iter().find(|c| !c.bounds.is_valid()) {
            return Err(format!("area {} has unusable bounds", chunk.id));
        }
        if let Some(step) = scenario
            .timeline
            .iter()
            .find(|s| !s.at_ms.is_finite() || s.at_ms < 0.0)
        {
            return Err(format!("timeline step at {} ms is out of range", step.at_ms));
        }
        scenario.timeline.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        Ok(scenario)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn duration_ms(&self) -> f64 {
        self.timeline.last().map_or(0.0, |s| s.at_ms)
    }
}
