//! Outgoing user notifications.
//!
//! Delivery failures never abort the action that triggered them; callers go
//! through [`deliver_invitation`] and [`deliver_password_change`], which log
//! and swallow the error.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use shared::domain::Role;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInvitation {
    pub recipient_email: String,
    pub recipient_name: String,
    pub added_by: String,
    pub group_name: String,
    pub role: Role,
}

impl GroupInvitation {
    pub fn subject(&self) -> String {
        format!("You have been added to the group {}", self.group_name)
    }

    pub fn body(&self) -> String {
        let role = match self.role {
            Role::Admin => "administrator",
            Role::Member => "member",
        };
        format!(
            "Hello {},\n\n{} has added you to the group \"{}\".\nYour role: {role}\n\n\
             You can now see and manage the events shared in this group.",
            self.recipient_name, self.added_by, self.group_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub recipient_email: String,
    pub recipient_name: String,
    pub changed_at: NaiveDateTime,
}

impl PasswordChanged {
    pub fn subject(&self) -> String {
        "Your password has been changed".to_string()
    }

    pub fn body(&self) -> String {
        format!(
            "Hello {},\n\nThe password of your calendar account was changed on {}.\n\
             If you did not make this change, contact support immediately.",
            self.recipient_name,
            self.changed_at.format("%Y-%m-%d %H:%M")
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_group_invitation(&self, invitation: &GroupInvitation) -> Result<()>;
    async fn send_password_change_notification(&self, notice: &PasswordChanged) -> Result<()>;
}

/// Renders notifications into the log instead of a mail transport.
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    pub from: String,
}

impl TracingNotifier {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_group_invitation(&self, invitation: &GroupInvitation) -> Result<()> {
        info!(
            from = %self.from,
            to = %invitation.recipient_email,
            subject = %invitation.subject(),
            body = %invitation.body(),
            "group invitation"
        );
        Ok(())
    }

    async fn send_password_change_notification(&self, notice: &PasswordChanged) -> Result<()> {
        info!(
            from = %self.from,
            to = %notice.recipient_email,
            subject = %notice.subject(),
            body = %notice.body(),
            "password change notice"
        );
        Ok(())
    }
}

pub(crate) async fn deliver_invitation(notifier: &dyn Notifier, invitation: &GroupInvitation) {
    if let Err(err) = notifier.send_group_invitation(invitation).await {
        warn!(
            to = %invitation.recipient_email,
            group = %invitation.group_name,
            error = ?err,
            "group invitation could not be delivered"
        );
    }
}

pub(crate) async fn deliver_password_change(notifier: &dyn Notifier, notice: &PasswordChanged) {
    if let Err(err) = notifier.send_password_change_notification(notice).await {
        warn!(
            to = %notice.recipient_email,
            error = ?err,
            "password change notice could not be delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn invitation_mentions_group_inviter_and_role() {
        let invitation = GroupInvitation {
            recipient_email: "bob@example.com".into(),
            recipient_name: "Bob".into(),
            added_by: "Alice Smith".into(),
            group_name: "Climbing".into(),
            role: Role::Admin,
        };
        assert!(invitation.subject().contains("Climbing"));
        let body = invitation.body();
        assert!(body.starts_with("Hello Bob"));
        assert!(body.contains("Alice Smith"));
        assert!(body.contains("administrator"));
    }

    #[test]
    fn password_notice_includes_change_time() {
        let notice = PasswordChanged {
            recipient_email: "bob@example.com".into(),
            recipient_name: "Bob".into(),
            changed_at: NaiveDate::from_ymd_opt(2025, 6, 1)
                .expect("date")
                .and_hms_opt(8, 5, 0)
                .expect("time"),
        };
        assert!(notice.body().contains("2025-06-01 08:05"));
    }
}
