use std::sync::Arc;

use shared::{
    domain::{GroupId, Person, Role, User, UserId},
    error::{ApiError, ErrorCode},
    store::CalendarStore,
};
use tracing::error;

pub mod auth;
pub mod calendar;
pub mod events;
pub mod groups;
pub mod labels;
pub mod notify;

pub use auth::{change_password, hash_password, login, register};
pub use calendar::{
    add_holiday, default_filter, list_holidays, load_calendar, visible_events, CalendarSnapshot,
};
pub use events::{create_event, delete_event};
pub use groups::{add_member, create_group, list_groups, list_members};
pub use labels::{create_label, delete_label, list_labels};
pub use notify::{GroupInvitation, Notifier, PasswordChanged, TracingNotifier};

/// Everything an operation needs besides the caller's [`Session`].
#[derive(Clone)]
pub struct ApiContext<S> {
    pub store: S,
    pub notifier: Arc<dyn Notifier>,
}

impl<S: CalendarStore> ApiContext<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }
}

/// The signed-in user. Created by [`login`] and passed explicitly to every
/// operation acting on their behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub person: Option<Person>,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn display_name(&self) -> String {
        match &self.person {
            Some(person) if !person.full_name().is_empty() => person.full_name(),
            _ => self.user.email.clone(),
        }
    }
}

pub(crate) fn storage_failure(err: anyhow::Error) -> ApiError {
    error!(error = ?err, "storage operation failed");
    ApiError::new(ErrorCode::StorageFailure, "storage operation failed")
}

pub(crate) fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

async fn ensure_membership<S: CalendarStore>(
    ctx: &ApiContext<S>,
    group_id: GroupId,
    user_id: UserId,
) -> Result<Role, ApiError> {
    ctx.store
        .membership_role(group_id, user_id)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::forbidden("user is not a member of this group"))
}

async fn ensure_admin<S: CalendarStore>(
    ctx: &ApiContext<S>,
    group_id: GroupId,
    user_id: UserId,
) -> Result<(), ApiError> {
    match ensure_membership(ctx, group_id, user_id).await? {
        Role::Admin => Ok(()),
        Role::Member => Err(ApiError::forbidden("only group admins can do this")),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
