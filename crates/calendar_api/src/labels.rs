use shared::{
    domain::{Label, LabelId},
    error::ApiError,
    protocol::LabelDraft,
    store::CalendarStore,
};
use tracing::info;

use crate::{ensure_admin, ensure_membership, required, storage_failure, ApiContext, Session};

pub async fn list_labels<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
) -> Result<Vec<Label>, ApiError> {
    ctx.store
        .find_labels_for_user(session.user_id())
        .await
        .map_err(storage_failure)
}

/// A label with a group is shared with every member of that group; without
/// one it belongs to the session user alone.
pub async fn create_label<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    draft: &LabelDraft,
) -> Result<LabelId, ApiError> {
    let draft = LabelDraft {
        name: required(&draft.name, "label name")?,
        color: required(&draft.color, "label color")?,
        group: draft.group,
    };
    if let Some(group_id) = draft.group {
        ensure_membership(ctx, group_id, session.user_id()).await?;
    }

    let label_id = ctx
        .store
        .save_label(&draft, session.user_id())
        .await
        .map_err(storage_failure)?;
    info!(
        label_id = label_id.0,
        group_id = draft.group.map(|id| id.0),
        "label created"
    );
    Ok(label_id)
}

/// Events carrying the label stay in place, unlabelled.
pub async fn delete_label<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    label_id: LabelId,
) -> Result<(), ApiError> {
    let label = ctx
        .store
        .find_label(label_id)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found("label not found"))?;

    match label.owning_group {
        Some(group_id) => ensure_admin(ctx, group_id, session.user_id()).await?,
        None => {
            let owner = ctx
                .store
                .label_owner(label_id)
                .await
                .map_err(storage_failure)?;
            if owner != Some(session.user_id()) {
                return Err(ApiError::forbidden("only the owner can delete this label"));
            }
        }
    }

    ctx.store
        .delete_label(label_id)
        .await
        .map_err(storage_failure)?;
    info!(label_id = label_id.0, "label deleted");
    Ok(())
}
