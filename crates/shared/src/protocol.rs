use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{GroupId, LabelId, Role, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
}

/// Event as entered in the creation form; `end` defaults to `start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub label: Option<LabelId>,
}

/// Validated event ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: Option<String>,
    pub creator: UserId,
    pub label: Option<LabelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDraft {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub group: Option<GroupId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitee {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invitees: Vec<Invitee>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group_id: GroupId,
    pub added: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_emails: Vec<String>,
}
