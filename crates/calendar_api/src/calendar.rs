use chrono::NaiveDate;
use serde::Serialize;
use shared::{
    domain::{Event, Group, Holiday, HolidayId, Label},
    error::ApiError,
    filter::FilterState,
    store::CalendarStore,
};
use tracing::debug;
use visibility::{resolve, GroupMemberships};

use crate::{required, storage_failure, ApiContext, Session};

/// Collaborator data for one resolution pass. Filters are applied on top of
/// it without going back to the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CalendarSnapshot {
    pub events: Vec<Event>,
    pub labels: Vec<Label>,
    pub groups: Vec<Group>,
    pub memberships: GroupMemberships,
    pub holidays: Vec<Holiday>,
}

pub async fn load_calendar<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
) -> Result<CalendarSnapshot, ApiError> {
    let user_id = session.user_id();
    let events = ctx
        .store
        .find_visible_candidates(user_id)
        .await
        .map_err(storage_failure)?;
    let labels = ctx
        .store
        .find_labels_for_user(user_id)
        .await
        .map_err(storage_failure)?;
    let groups = ctx
        .store
        .find_groups_for_user(user_id)
        .await
        .map_err(storage_failure)?;

    let mut memberships = GroupMemberships::new();
    for group in &groups {
        let member_ids = ctx
            .store
            .find_member_ids(group.id)
            .await
            .map_err(storage_failure)?;
        memberships.insert(group.id, member_ids);
    }

    let holidays = ctx.store.list_holidays().await.map_err(storage_failure)?;
    debug!(
        user_id = user_id.0,
        events = events.len(),
        labels = labels.len(),
        groups = groups.len(),
        "calendar snapshot loaded"
    );

    Ok(CalendarSnapshot {
        events,
        labels,
        groups,
        memberships,
        holidays,
    })
}

/// Every label and group checked, the state a freshly opened calendar shows.
pub fn default_filter(snapshot: &CalendarSnapshot) -> FilterState {
    FilterState::all_checked(&snapshot.labels, &snapshot.groups)
}

pub fn visible_events<'a>(
    session: &Session,
    snapshot: &'a CalendarSnapshot,
    filter: &FilterState,
) -> Vec<&'a Event> {
    resolve(
        session.user_id(),
        &snapshot.events,
        &snapshot.labels,
        &snapshot.memberships,
        filter,
    )
}

pub async fn list_holidays<S: CalendarStore>(ctx: &ApiContext<S>) -> Result<Vec<Holiday>, ApiError> {
    ctx.store.list_holidays().await.map_err(storage_failure)
}

/// Feb 29 is accepted; it only shows up in leap years.
pub async fn add_holiday<S: CalendarStore>(
    ctx: &ApiContext<S>,
    name: &str,
    month: u32,
    day: u32,
) -> Result<HolidayId, ApiError> {
    let name = required(name, "holiday name")?;
    if NaiveDate::from_ymd_opt(2024, month, day).is_none() {
        return Err(ApiError::validation(format!(
            "{month:02}-{day:02} is not a calendar date"
        )));
    }
    ctx.store
        .add_holiday(&name, month, day)
        .await
        .map_err(storage_failure)
}
