use areamap_shared::{AreaId, AreaIdSet, AreaKind};

/// Next `(pinned, transient)` pair for a click on `id`.
///
/// Additive clicks toggle membership: a selected id leaves whichever set holds
/// it, anything else joins `transient`. A plain click on the sole selected id
/// clears it; on a pinned id it keeps `pinned` and drops `transient`; on any
/// other id it narrows `transient` to just that id.
pub fn toggle(
    id: &AreaId,
    additive: bool,
    pinned: &AreaIdSet,
    transient: &AreaIdSet,
) -> (AreaIdSet, AreaIdSet) {
    let in_pinned = pinned.contains(id);
    let in_transient = transient.contains(id);
    let mut next_pinned = pinned.clone();
    let mut next_transient = transient.clone();

    if additive {
        if in_pinned {
            next_pinned.remove(id);
        } else if in_transient {
            next_transient.remove(id);
        } else {
            next_transient.insert(id.clone());
        }
        return (next_pinned, next_transient);
    }

    let selected_count = pinned.len() + transient.len();
    let is_sole = selected_count == 1 && (in_pinned || in_transient);
    if is_sole {
        next_pinned.remove(id);
        next_transient.remove(id);
    } else if in_pinned {
        next_transient.clear();
    } else {
        next_transient = AreaIdSet::from([id.clone()]);
    }
    (next_pinned, next_transient)
}

/// Pinned and transient selection for one area kind. The two sets never share an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pinned: AreaIdSet,
    transient: AreaIdSet,
}

impl SelectionState {
    pub fn pinned(&self) -> &AreaIdSet {
        &self.pinned
    }

    pub fn transient(&self) -> &AreaIdSet {
        &self.transient
    }

    /// `pinned ∪ transient`.
    pub fn effective(&self) -> AreaIdSet {
        self.pinned.union(&self.transient).cloned().collect()
    }

    pub fn is_selected(&self, id: &AreaId) -> bool {
        self.pinned.contains(id) || self.transient.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.transient.is_empty()
    }

    /// Apply a click. Returns whether anything changed.
    pub fn apply_toggle(&mut self, id: &AreaId, additive: bool) -> bool {
        let (pinned, transient) = toggle(id, additive, &self.pinned, &self.transient);
        self.replace(pinned, transient)
    }

    /// Union `ids` into `transient`, skipping ids that are already pinned.
    pub fn add_transient<'a>(&mut self, ids: impl IntoIterator<Item = &'a AreaId>) -> bool {
        let mut changed = false;
        for id in ids {
            if !self.pinned.contains(id) {
                changed |= self.transient.insert(id.clone());
            }
        }
        changed
    }

    pub fn clear_transient(&mut self) -> bool {
        if self.transient.is_empty() {
            return false;
        }
        self.transient.clear();
        true
    }

    /// Replace `pinned` wholesale. Newly pinned ids leave `transient`.
    pub fn set_pinned(&mut self, ids: AreaIdSet) -> bool {
        let transient: AreaIdSet = self.transient.difference(&ids).cloned().collect();
        self.replace(ids, transient)
    }

    fn replace(&mut self, pinned: AreaIdSet, transient: AreaIdSet) -> bool {
        debug_assert!(pinned.is_disjoint(&transient));
        if pinned == self.pinned && transient == self.transient {
            return false;
        }
        self.pinned = pinned;
        self.transient = transient;
        true
    }
}

/// One [`SelectionState`] per area kind.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    primary: SelectionState,
    aggregate: SelectionState,
}

impl SelectionStore {
    pub fn get(&self, kind: AreaKind) -> &SelectionState {
        match kind {
            AreaKind::Primary => &self.primary,
            AreaKind::Aggregate => &self.aggregate,
        }
    }

    pub fn get_mut(&mut self, kind: AreaKind) -> &mut SelectionState {
        match kind {
            AreaKind::Primary => &mut self.primary,
            AreaKind::Aggregate => &mut self.aggregate,
        }
    }
}
