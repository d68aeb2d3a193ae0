//! Decides which calendar events render for a user under the current sidebar
//! selection.
//!
//! [`resolve`] is a pure function over one consistent snapshot of events,
//! labels and group memberships. It never fails: absent labels or groups mean
//! "no restriction", and unknown creators only see their own events through.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Event, GroupId, Label, LabelId, UserId},
    filter::FilterState,
};

pub mod layout;

/// Member ids per group the current user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMemberships {
    members: HashMap<GroupId, HashSet<UserId>>,
}

impl GroupMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group_id: GroupId, member_ids: impl IntoIterator<Item = UserId>) {
        self.members
            .entry(group_id)
            .or_default()
            .extend(member_ids);
    }

    pub fn members_of(&self, group_id: GroupId) -> impl Iterator<Item = UserId> + '_ {
        self.members
            .get(&group_id)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    pub fn is_member(&self, group_id: GroupId, user_id: UserId) -> bool {
        self.members
            .get(&group_id)
            .is_some_and(|ids| ids.contains(&user_id))
    }
}

impl FromIterator<(GroupId, Vec<UserId>)> for GroupMemberships {
    fn from_iter<I: IntoIterator<Item = (GroupId, Vec<UserId>)>>(iter: I) -> Self {
        let mut memberships = Self::new();
        for (group_id, member_ids) in iter {
            memberships.insert(group_id, member_ids);
        }
        memberships
    }
}

/// Ids derived from the filter once per resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSelection {
    pub active_group_ids: HashSet<GroupId>,
    pub visible_label_ids: HashSet<LabelId>,
    pub visible_creator_ids: HashSet<UserId>,
    pub known_label_ids: HashSet<LabelId>,
}

impl ActiveSelection {
    pub fn compute(labels: &[Label], memberships: &GroupMemberships, filter: &FilterState) -> Self {
        let active_group_ids: HashSet<GroupId> = filter.checked_group_ids.iter().copied().collect();

        let visible_label_ids = labels
            .iter()
            .filter(|label| match label.owning_group {
                None => true,
                Some(group_id) => active_group_ids.contains(&group_id),
            })
            .filter(|label| filter.is_label_checked(label.id))
            .map(|label| label.id)
            .collect();

        let visible_creator_ids = active_group_ids
            .iter()
            .flat_map(|group_id| memberships.members_of(*group_id))
            .collect();

        Self {
            active_group_ids,
            visible_label_ids,
            visible_creator_ids,
            known_label_ids: labels.iter().map(|label| label.id).collect(),
        }
    }

    pub fn is_visible(&self, current_user: UserId, event: &Event) -> bool {
        if event.creator == current_user {
            return match event.label {
                None => true,
                Some(label_id) => self.visible_label_ids.contains(&label_id),
            };
        }

        if !self.visible_creator_ids.contains(&event.creator) {
            return false;
        }

        // Only a label the viewer knows about and has unchecked hides a shared
        // event; labels outside the viewer's set never do.
        match event.label {
            Some(label_id) => {
                !self.known_label_ids.contains(&label_id)
                    || self.visible_label_ids.contains(&label_id)
            }
            None => true,
        }
    }
}

/// Returns the events eligible to display for `current_user`, in input order.
///
/// Date placement (day/week/month cells) is left to [`layout`].
pub fn resolve<'a>(
    current_user: UserId,
    events: &'a [Event],
    labels: &[Label],
    memberships: &GroupMemberships,
    filter: &FilterState,
) -> Vec<&'a Event> {
    let selection = ActiveSelection::compute(labels, memberships, filter);
    events
        .iter()
        .filter(|event| selection.is_visible(current_user, event))
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
