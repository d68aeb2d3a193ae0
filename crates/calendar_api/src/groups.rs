use std::collections::HashSet;

use shared::{
    domain::{Group, GroupId, Member, Role, User, UserId},
    error::ApiError,
    protocol::{GroupCreated, GroupDraft},
    store::CalendarStore,
};
use tracing::{info, warn};

use crate::{
    ensure_admin, ensure_membership, normalize_email,
    notify::{deliver_invitation, GroupInvitation},
    optional_text, required, storage_failure, ApiContext, Session,
};

pub async fn list_groups<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
) -> Result<Vec<Group>, ApiError> {
    ctx.store
        .find_groups_for_user(session.user_id())
        .await
        .map_err(storage_failure)
}

pub async fn list_members<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    group_id: GroupId,
) -> Result<Vec<Member>, ApiError> {
    ensure_membership(ctx, group_id, session.user_id()).await?;
    ctx.store
        .list_members(group_id)
        .await
        .map_err(storage_failure)
}

/// Creates the group with the session user as admin and enrols every invitee
/// that resolves to a registered account. Invitees are looked up before
/// anything is written, so a failure leaves no partial group behind. Unknown
/// emails are reported back rather than failing the whole group.
pub async fn create_group<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    draft: &GroupDraft,
) -> Result<GroupCreated, ApiError> {
    let name = required(&draft.name, "group name")?;
    let description = optional_text(draft.description.as_deref());

    let own_email = normalize_email(&session.user.email);
    let mut seen = HashSet::new();
    let mut invitations = Vec::new();
    let mut unknown_emails = Vec::new();
    for invitee in &draft.invitees {
        let email = normalize_email(&invitee.email);
        if email.is_empty() || email == own_email || !seen.insert(email.clone()) {
            continue;
        }
        match find_user(ctx, &email).await? {
            Some(user) => {
                let invitation = invitation_for(ctx, session, &name, &user, invitee.role).await?;
                invitations.push((user.id, invitation));
            }
            None => {
                warn!(email = %email, "invitee is not registered");
                unknown_emails.push(email);
            }
        }
    }

    let members: Vec<(UserId, Role)> = invitations
        .iter()
        .map(|(user_id, invitation)| (*user_id, invitation.role))
        .collect();
    let group_id = ctx
        .store
        .create_group(&name, description.as_deref(), session.user_id(), &members)
        .await
        .map_err(storage_failure)?;
    info!(
        group_id = group_id.0,
        creator = session.user_id().0,
        invited = members.len(),
        "group created"
    );

    for (_, invitation) in &invitations {
        deliver_invitation(ctx.notifier.as_ref(), invitation).await;
    }
    Ok(GroupCreated {
        group_id,
        added: members.into_iter().map(|(user_id, _)| user_id).collect(),
        unknown_emails,
    })
}

/// Adds a registered user to the group, or changes the role of an existing
/// member. The last admin of a group cannot be demoted.
pub async fn add_member<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    group_id: GroupId,
    email: &str,
    role: Role,
) -> Result<UserId, ApiError> {
    let group = ctx
        .store
        .find_group(group_id)
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found("group not found"))?;
    ensure_admin(ctx, group_id, session.user_id()).await?;

    let email = normalize_email(&required(email, "email")?);
    let user = find_user(ctx, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("no registered user with that email"))?;

    let current = ctx
        .store
        .membership_role(group_id, user.id)
        .await
        .map_err(storage_failure)?;
    match current {
        Some(existing) if existing == role => {
            return Err(ApiError::validation("user is already a member of this group"));
        }
        Some(Role::Admin) => ensure_other_admin(ctx, group_id, user.id).await?,
        _ => {}
    }

    let invitation = invitation_for(ctx, session, &group.name, &user, role).await?;
    ctx.store
        .add_member(group_id, user.id, role)
        .await
        .map_err(storage_failure)?;
    info!(group_id = group_id.0, user_id = user.id.0, role = role.as_str(), "member added");

    deliver_invitation(ctx.notifier.as_ref(), &invitation).await;
    Ok(user.id)
}

async fn find_user<S: CalendarStore>(
    ctx: &ApiContext<S>,
    email: &str,
) -> Result<Option<User>, ApiError> {
    ctx.store
        .find_user_by_email(email)
        .await
        .map_err(storage_failure)
}

async fn ensure_other_admin<S: CalendarStore>(
    ctx: &ApiContext<S>,
    group_id: GroupId,
    demoted: UserId,
) -> Result<(), ApiError> {
    let members = ctx
        .store
        .list_members(group_id)
        .await
        .map_err(storage_failure)?;
    if members
        .iter()
        .any(|member| member.role == Role::Admin && member.user_id != demoted)
    {
        Ok(())
    } else {
        Err(ApiError::validation("a group must keep at least one admin"))
    }
}

async fn invitation_for<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &Session,
    group_name: &str,
    user: &User,
    role: Role,
) -> Result<GroupInvitation, ApiError> {
    let recipient_name = match user.person_id {
        Some(person_id) => ctx
            .store
            .find_person(person_id)
            .await
            .map_err(storage_failure)?
            .map(|person| person.full_name()),
        None => None,
    };
    Ok(GroupInvitation {
        recipient_email: user.email.clone(),
        recipient_name: recipient_name.unwrap_or_else(|| user.email.clone()),
        added_by: session.display_name(),
        group_name: group_name.to_string(),
        role,
    })
}
