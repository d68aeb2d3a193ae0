use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Group, GroupId, Label, LabelId};

/// Sidebar checkbox state. Rebuilt every time a calendar view loads and never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub checked_label_ids: BTreeSet<LabelId>,
    pub checked_group_ids: BTreeSet<GroupId>,
}

impl FilterState {
    pub fn all_checked<'a>(
        labels: impl IntoIterator<Item = &'a Label>,
        groups: impl IntoIterator<Item = &'a Group>,
    ) -> Self {
        Self {
            checked_label_ids: labels.into_iter().map(|label| label.id).collect(),
            checked_group_ids: groups.into_iter().map(|group| group.id).collect(),
        }
    }

    pub fn is_label_checked(&self, label_id: LabelId) -> bool {
        self.checked_label_ids.contains(&label_id)
    }

    pub fn is_group_checked(&self, group_id: GroupId) -> bool {
        self.checked_group_ids.contains(&group_id)
    }

    pub fn set_label(&mut self, label_id: LabelId, checked: bool) {
        if checked {
            self.checked_label_ids.insert(label_id);
        } else {
            self.checked_label_ids.remove(&label_id);
        }
    }

    pub fn set_group(&mut self, group_id: GroupId, checked: bool) {
        if checked {
            self.checked_group_ids.insert(group_id);
        } else {
            self.checked_group_ids.remove(&group_id);
        }
    }

    /// Returns the new checked state.
    pub fn toggle_label(&mut self, label_id: LabelId) -> bool {
        let checked = !self.is_label_checked(label_id);
        self.set_label(label_id, checked);
        checked
    }

    /// Returns the new checked state.
    pub fn toggle_group(&mut self, group_id: GroupId) -> bool {
        let checked = !self.is_group_checked(group_id);
        self.set_group(group_id, checked);
        checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: i64) -> Label {
        Label {
            id: LabelId(id),
            name: format!("label-{id}"),
            color: "red".into(),
            owning_group: None,
        }
    }

    #[test]
    fn all_checked_includes_every_label_and_group() {
        let labels = vec![label(1), label(2)];
        let groups = vec![Group {
            id: GroupId(7),
            name: "team".into(),
            description: None,
        }];
        let filter = FilterState::all_checked(&labels, &groups);
        assert!(filter.is_label_checked(LabelId(1)));
        assert!(filter.is_label_checked(LabelId(2)));
        assert!(filter.is_group_checked(GroupId(7)));
        assert!(!filter.is_group_checked(GroupId(8)));
    }

    #[test]
    fn toggling_twice_restores_state() {
        let labels = vec![label(1)];
        let mut filter = FilterState::all_checked(&labels, &[]);
        assert!(!filter.toggle_label(LabelId(1)));
        assert!(!filter.is_label_checked(LabelId(1)));
        assert!(filter.toggle_label(LabelId(1)));
        assert!(filter.is_label_checked(LabelId(1)));

        assert!(filter.toggle_group(GroupId(3)));
        assert!(!filter.toggle_group(GroupId(3)));
    }
}
