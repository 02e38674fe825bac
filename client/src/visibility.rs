use areamap_shared::{AreaIdSet, AreaKind};

use crate::engine::{RenderEngine, ScreenRect, swallow};

/// Primary ids currently rendered on the canvas.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    visible: AreaIdSet,
}

impl VisibilityTracker {
    pub fn visible(&self) -> &AreaIdSet {
        &self.visible
    }

    /// Replace the visible set. Returns `true` only if it changed.
    pub fn update(&mut self, next: AreaIdSet) -> bool {
        if self.visible.symmetric_difference(&next).next().is_none() {
            return false;
        }
        self.visible = next;
        true
    }

    /// Query the engine over `canvas`. A failed query leaves the set untouched.
    pub fn probe(&mut self, engine: &impl RenderEngine, canvas: ScreenRect) -> bool {
        match swallow(
            "query_rendered_ids",
            engine.query_rendered_ids(AreaKind::Primary, canvas),
        ) {
            Some(ids) => self.update(ids),
            None => false,
        }
    }
}
