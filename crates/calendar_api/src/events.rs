use shared::{
    domain::{EventId, LabelId},
    error::ApiError,
    protocol::{EventDraft, NewEvent},
    store::CalendarStore,
};
use tracing::info;

use crate::{optional_text, required, storage_failure, ApiContext, Session};

pub async fn create_event<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    draft: &EventDraft,
) -> Result<EventId, ApiError> {
    let title = required(&draft.title, "title")?;
    let start = draft
        .start
        .ok_or_else(|| ApiError::validation("start date and time are required"))?;
    // An end before the start is kept as entered; the day timeline clamps it.
    let end = draft.end.unwrap_or(start);
    if let Some(label_id) = draft.label {
        ensure_label_usable(ctx, session, label_id).await?;
    }

    let event = NewEvent {
        title,
        description: optional_text(draft.description.as_deref()),
        start,
        end,
        location: optional_text(draft.location.as_deref()),
        creator: session.user_id(),
        label: draft.label,
    };
    let event_id = ctx.store.save_event(&event).await.map_err(storage_failure)?;
    info!(event_id = event_id.0, creator = session.user_id().0, "event created");
    Ok(event_id)
}

pub async fn delete_event<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    event_id: EventId,
) -> Result<(), ApiError> {
    let event = ctx
        .store
        .find_event(event_id)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found("event not found"))?;
    if event.creator != session.user_id() {
        return Err(ApiError::forbidden("only the creator can delete this event"));
    }

    ctx.store
        .delete_event(event_id)
        .await
        .map_err(storage_failure)?;
    info!(event_id = event_id.0, "event deleted");
    Ok(())
}

async fn ensure_label_usable<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    label_id: LabelId,
) -> Result<(), ApiError> {
    let labels = ctx
        .store
        .find_labels_for_user(session.user_id())
        .await
        .map_err(storage_failure)?;
    if labels.iter().any(|label| label.id == label_id) {
        Ok(())
    } else {
        Err(ApiError::validation("label is not available to this user"))
    }
}
