use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use sha2::{Digest, Sha256};
use shared::{
    domain::UserId,
    error::ApiError,
    protocol::{NewPerson, RegisterRequest},
    store::CalendarStore,
};
use tracing::info;

use crate::{
    normalize_email,
    notify::{deliver_password_change, PasswordChanged},
    required, storage_failure, ApiContext, Session,
};

const INCORRECT_CREDENTIALS: &str = "incorrect credentials";

/// SHA-256 of the UTF-8 password, base64 encoded with padding.
pub fn hash_password(password: &str) -> String {
    STANDARD.encode(Sha256::digest(password.as_bytes()))
}

pub async fn register<S: CalendarStore>(
    ctx: &ApiContext<S>,
    request: &RegisterRequest,
) -> Result<UserId, ApiError> {
    let first_name = required(&request.first_name, "first name")?;
    let last_name = required(&request.last_name, "last name")?;
    let email = normalize_email(&required(&request.email, "email")?);
    if request.password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("email address is not valid"));
    }

    let existing = ctx
        .store
        .find_user_by_email(&email)
        .await
        .map_err(storage_failure)?;
    if existing.is_some() {
        return Err(ApiError::validation("email already registered"));
    }

    let user_id = ctx
        .store
        .register(
            &NewPerson {
                first_name,
                last_name,
            },
            &email,
            &hash_password(&request.password),
        )
        .await
        .map_err(storage_failure)?;
    info!(user_id = user_id.0, "user registered");
    Ok(user_id)
}

/// Unknown email and wrong password are reported identically.
pub async fn login<S: CalendarStore>(
    ctx: &ApiContext<S>,
    email: &str,
    password: &str,
) -> Result<Session, ApiError> {
    let email = normalize_email(&required(email, "email")?);
    if password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }

    let user = ctx
        .store
        .authenticate(&email, &hash_password(password))
        .await
        .map_err(storage_failure)?
        .ok_or_else(|| ApiError::not_found(INCORRECT_CREDENTIALS))?;

    let person = match user.person_id {
        Some(person_id) => ctx
            .store
            .find_person(person_id)
            .await
            .map_err(storage_failure)?,
        None => None,
    };

    Ok(Session { user, person })
}

pub async fn change_password<S: CalendarStore>(
    ctx: &ApiContext<S>,
    session: &mut Session,
    new_password: &str,
    confirmation: &str,
) -> Result<(), ApiError> {
    if new_password.is_empty() || confirmation.is_empty() {
        return Err(ApiError::validation("both password fields are required"));
    }
    if new_password != confirmation {
        return Err(ApiError::validation("passwords do not match"));
    }

    let password_hash = hash_password(new_password);
    ctx.store
        .update_password_hash(session.user_id(), &password_hash)
        .await
        .map_err(storage_failure)?;
    session.user.password_hash = password_hash;
    info!(user_id = session.user_id().0, "password changed");

    let notice = PasswordChanged {
        recipient_email: session.user.email.clone(),
        recipient_name: session.display_name(),
        changed_at: Local::now().naive_local(),
    };
    deliver_password_change(ctx.notifier.as_ref(), &notice).await;
    Ok(())
}
