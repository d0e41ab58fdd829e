use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireUser, hash_password, issue_token, verify_password};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_display_name, validate_email, validate_password};
use crate::types::{ROLE_USER, User};

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    validate_email(&req.email)?;
    validate_display_name(&req.name)?;
    validate_password(&req.password)?;

    if store
        .exists_by_email(&req.email)
        .api_err("Failed to check email")?
    {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: req.email,
        name: req.name,
        password_hash: hash_password(&req.password).api_err("Failed to hash password")?,
        active: true,
        roles: BTreeSet::from([ROLE_USER.to_string()]),
        created_at: now,
        updated_at: now,
    };

    // A concurrent registration of the same email surfaces as a conflict here.
    store.create_user(&user).map_err(ApiError::from)?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state
        .store
        .get_user_by_email(&req.email)
        .api_err("Failed to look up user")?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash).api_err("Failed to verify password")?
    {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Err(invalid());
    }

    if !user.active {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    let expires_at = match state.token_ttl {
        Some(ttl) => Some(Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            tracing::error!(?ttl, "Token lifetime overflows the clock");
            ApiError::internal("Token lifetime out of range")
        })?),
        None => None,
    };
    let (token, raw_token) =
        issue_token(&state, &user.id, expires_at).api_err("Failed to issue token")?;

    tracing::info!(user_id = %user.id, token_id = %token.id, "User logged in");

    let response = LoginResponse {
        token: raw_token,
        token_id: token.id,
        expires_at: token.expires_at,
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn logout(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .store
        .delete_token(&auth.token.id)
        .api_err("Failed to delete token")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn get_me(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

pub async fn update_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let mut user = auth.user;

    if let Some(name) = req.name {
        validate_display_name(&name)?;
        user.name = name;
    }
    if let Some(password) = req.password {
        validate_password(&password)?;
        user.password_hash = hash_password(&password).api_err("Failed to hash password")?;
    }
    user.updated_at = Utc::now();

    state.store.update_user(&user).api_err("Failed to update user")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}
