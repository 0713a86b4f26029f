use anyhow::Context;
use axum::extract::FromRef;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        jwt::JwtKeys,
        password,
    },
    error::AppError,
    state::AppState,
    users::{NewUser, PublicUser, User},
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_USERNAME_LEN: usize = 3;

/// Length in UTF-16 code units, the way clients count characters.
pub(crate) fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

pub(crate) fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

pub(crate) fn normalize_username(username: Option<&str>) -> Option<String> {
    username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
}

/// Deterministic avatar for a username.
pub fn avatar_url(base: &str, username: &str) -> String {
    format!("{}?seed={}", base, urlencoding::encode(username))
}

fn missing_fields(route: &str, fields: &[(&str, bool)]) -> AppError {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    warn!(route, missing = %missing.join(","), "missing fields");
    AppError::Validation(format!(
        "Missing: {}. Please fill all fields.",
        missing.join(", ")
    ))
}

async fn hash_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .context("hash task panicked")?
}

async fn verify_blocking(plain: String, hash: Option<String>) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => password::verify_password(&plain, &hash),
        None => Ok(password::verify_dummy(&plain)),
    })
    .await
    .context("verify task panicked")?
}

fn respond(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let token = JwtKeys::from_ref(state).issue(user.id)?;
    Ok(AuthResponse {
        token,
        user: PublicUser::from(user),
    })
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(req.email.as_deref());
    let username = normalize_username(req.username.as_deref());
    let plain = req.password.filter(|p| !p.is_empty());

    let (email, username, plain) = match (email, username, plain) {
        (Some(e), Some(u), Some(p)) => (e, u, p),
        (e, u, p) => {
            return Err(missing_fields(
                "register",
                &[
                    ("username", u.is_some()),
                    ("email", e.is_some()),
                    ("password", p.is_some()),
                ],
            ))
        }
    };

    if utf16_len(&plain) < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Password should be at least 6 characters long".into(),
        ));
    }
    if utf16_len(&username) < MIN_USERNAME_LEN {
        return Err(AppError::Validation(
            "Username should be at least 3 characters long".into(),
        ));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already exists".into()));
    }
    if state.users.find_by_username(&username).await?.is_some() {
        warn!(username = %username, "username already taken");
        return Err(AppError::Conflict("Username already exists".into()));
    }

    let profile_image = avatar_url(&state.config.avatar_base_url, &username);
    let password_hash = hash_blocking(plain).await?;

    let user = state
        .users
        .create(NewUser {
            email,
            username,
            password_hash,
            profile_image,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    respond(state, user)
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(req.email.as_deref());
    let plain = req.password.filter(|p| !p.is_empty());

    let (email, plain) = match (email, plain) {
        (Some(e), Some(p)) => (e, p),
        (e, p) => {
            return Err(missing_fields(
                "login",
                &[("email", e.is_some()), ("password", p.is_some())],
            ))
        }
    };

    let user = state.users.find_by_email(&email).await?;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let ok = verify_blocking(plain, stored_hash).await?;

    let user = match user {
        Some(u) if ok => u,
        Some(u) => {
            warn!(email = %email, user_id = %u.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    info!(user_id = %user.id, "user logged in");
    respond(state, user)
}

pub async fn me(state: &AppState, user_id: uuid::Uuid) -> Result<PublicUser, AppError> {
    state
        .users
        .find_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| {
            warn!(user_id = %user_id, "token for unknown user");
            AppError::Unauthorized("User not found".into())
        })
}
