//! Persistence contracts consumed by the application layer.
//!
//! Every method reports infrastructure failures through `anyhow::Result`;
//! "nothing matched" is expressed with `Option`/`bool`, never as an error.

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    domain::{
        Event, EventId, Group, GroupId, Holiday, HolidayId, Label, LabelId, Member, Person,
        PersonId, Role, User, UserId,
    },
    protocol::{LabelDraft, NewEvent, NewPerson},
};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Every event the user may ever see: created by them, shared with them,
    /// tagged with one of their labels, or created by someone sharing a group
    /// with them. Checkbox filtering happens later.
    async fn find_visible_candidates(&self, user_id: UserId) -> Result<Vec<Event>>;
    async fn save_event(&self, event: &NewEvent) -> Result<EventId>;
    async fn find_event(&self, event_id: EventId) -> Result<Option<Event>>;
    async fn delete_event(&self, event_id: EventId) -> Result<bool>;
}

#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Personal labels of the user plus labels owned by any of their groups.
    async fn find_labels_for_user(&self, user_id: UserId) -> Result<Vec<Label>>;
    async fn save_label(&self, draft: &LabelDraft, user_id: UserId) -> Result<LabelId>;
    async fn find_label(&self, label_id: LabelId) -> Result<Option<Label>>;
    /// The user a personal label is linked to; `None` for group labels.
    async fn label_owner(&self, label_id: LabelId) -> Result<Option<UserId>>;
    async fn delete_label(&self, label_id: LabelId) -> Result<bool>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>>;
    async fn find_group(&self, group_id: GroupId) -> Result<Option<Group>>;
    async fn find_member_ids(&self, group_id: GroupId) -> Result<Vec<UserId>>;
    async fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>>;
    async fn membership_role(&self, group_id: GroupId, user_id: UserId) -> Result<Option<Role>>;
    /// Creates the group, enrols `creator` as its admin and every entry of
    /// `members` with its role, all in one transaction.
    async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        creator: UserId,
        members: &[(UserId, Role)],
    ) -> Result<GroupId>;
    async fn add_member(&self, group_id: GroupId, user_id: UserId, role: Role) -> Result<()>;
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn authenticate(&self, email: &str, password_hash: &str) -> Result<Option<User>>;
    async fn register(
        &self,
        person: &NewPerson,
        email: &str,
        password_hash: &str,
    ) -> Result<UserId>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_person(&self, person_id: PersonId) -> Result<Option<Person>>;
    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait HolidayStore: Send + Sync {
    async fn list_holidays(&self) -> Result<Vec<Holiday>>;
    async fn add_holiday(&self, name: &str, month: u32, day: u32) -> Result<HolidayId>;
}

/// Everything the calendar needs from persistence.
pub trait CalendarStore: EventStore + LabelStore + GroupStore + AuthStore + HolidayStore {}

impl<T> CalendarStore for T where T: EventStore + LabelStore + GroupStore + AuthStore + HolidayStore
{}
