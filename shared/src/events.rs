use serde::{Deserialize, Serialize};

use crate::area::{AreaId, AreaKind, Bounds};
use crate::stats::{LegendRangeMode, PointOfInterest, StatDescriptor, StatisticId};

/// Bumped whenever a variant is added, removed or reshaped.
pub const PROTOCOL_VERSION: u32 = 1;

/// Envelope carrying the protocol version alongside a command or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Versioned<T> {
    pub fn new(payload: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Inbound commands from the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    SetPinnedIds {
        kind: AreaKind,
        ids: Vec<AreaId>,
    },
    SetHoveredId {
        kind: AreaKind,
        #[serde(default)]
        id: Option<AreaId>,
    },
    /// `kind: None` clears both kinds.
    ClearTransientSelection {
        #[serde(default)]
        kind: Option<AreaKind>,
    },
    AddTransientIds {
        kind: AreaKind,
        ids: Vec<AreaId>,
    },
    SetBoundaryMode {
        kind: AreaKind,
    },
    SetSelectedStat {
        #[serde(default)]
        stat_id: Option<StatisticId>,
    },
    SetLegendRangeMode {
        mode: LegendRangeMode,
    },
    SetMarkersVisible {
        visible: bool,
    },
    SetPointsOfInterest {
        points: Vec<PointOfInterest>,
    },
    SetCategoryFilter {
        #[serde(default)]
        category: Option<String>,
    },
    SetStatDescriptors {
        descriptors: Vec<StatDescriptor>,
    },
}

/// In-map interaction events, already hit-tested by the rendering engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    /// Pointer moved over the boundary layer. `id: None` means it is over no polygon.
    PointerMove {
        kind: AreaKind,
        #[serde(default)]
        id: Option<AreaId>,
    },
    PointerLeave {
        kind: AreaKind,
    },
    Click {
        kind: AreaKind,
        id: AreaId,
        #[serde(default)]
        additive: bool,
    },
    /// Rubber-band or lasso selection finished.
    BoxSelect {
        kind: AreaKind,
        ids: Vec<AreaId>,
    },
    DragStart,
    DragEnd,
    BadgeHover {
        kind: AreaKind,
        #[serde(default)]
        id: Option<AreaId>,
    },
    Escape,
    CameraSettled {
        bounds: Bounds,
        zoom: f64,
    },
    PickBoundaryMode {
        kind: AreaKind,
    },
    PickStat {
        #[serde(default)]
        stat_id: Option<StatisticId>,
    },
}

/// Outbound notifications to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapNotification {
    AreaSelectionChange {
        kind: AreaKind,
        selected: Vec<AreaId>,
        pinned: Vec<AreaId>,
        transient: Vec<AreaId>,
    },
    AreaHoverChange {
        kind: AreaKind,
        id: Option<AreaId>,
    },
    StatSelectionChange {
        stat_id: Option<StatisticId>,
    },
    BoundaryModeChange {
        kind: AreaKind,
    },
}
