use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::access::{AccessControl, ShareRegistry};
use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{CreateShareRequest, UpdateShareRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::store::Store;
use crate::types::{Share, SharePermission, User};

use super::access::require_owner;

fn parse_permission(value: &str) -> Result<SharePermission, ApiError> {
    value.parse::<SharePermission>().map_err(ApiError::from)
}

fn share_err(e: Error) -> ApiError {
    match e {
        Error::NotFound => ApiError::not_found("Share not found"),
        other => other.into(),
    }
}

fn load_share(store: &dyn Store, share_id: &str) -> Result<Share, ApiError> {
    ShareRegistry::new(store)
        .get(share_id)
        .api_err("Failed to get share")?
        .or_not_found("Share not found")
}

/// Both sides of a share may see or remove it: the calendar owner and the grantee.
fn require_share_party(store: &dyn Store, user: &User, share: &Share) -> Result<(), ApiError> {
    if share.grantee_id == user.id {
        return Ok(());
    }

    let owner = AccessControl::new(store)
        .is_owner(&share.calendar_id, &user.id)
        .map_err(share_err)?;

    if !owner {
        return Err(ApiError::forbidden("Insufficient calendar permissions"));
    }
    Ok(())
}

fn resolve_grantee(store: &dyn Store, req: &CreateShareRequest) -> Result<String, ApiError> {
    match (&req.grantee_id, &req.grantee_email) {
        (Some(id), None) => Ok(id.clone()),
        (None, Some(email)) => {
            let user = store
                .get_user_by_email(email)
                .api_err("Failed to look up grantee")?
                .or_not_found("User not found")?;
            Ok(user.id)
        }
        _ => Err(ApiError::bad_request(
            "Exactly one of grantee_id or grantee_email is required",
        )),
    }
}

pub async fn list_calendar_shares(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(calendar_id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let calendar = require_owner(store, &auth.user, &calendar_id)?;

    let shares = ShareRegistry::new(store)
        .list_by_calendar(&calendar.id)
        .api_err("Failed to list shares")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(shares)))
}

pub async fn create_share(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(calendar_id): Path<String>,
    Json(req): Json<CreateShareRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let calendar = require_owner(store, &auth.user, &calendar_id)?;

    let permission = parse_permission(&req.permission)?;
    let grantee_id = resolve_grantee(store, &req)?;

    let share = ShareRegistry::new(store)
        .grant(&calendar.id, &grantee_id, permission)
        .map_err(|e| match e {
            Error::NotFound => ApiError::not_found("User not found"),
            other => other.into(),
        })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(share))))
}

/// Removes the share between a calendar and a user. The owner may revoke anyone;
/// a grantee may only remove themselves. Succeeds when no share exists.
pub async fn revoke_share(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((calendar_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let caller = &auth.user;

    let owner = AccessControl::new(store)
        .is_owner(&calendar_id, &caller.id)
        .map_err(|e| match e {
            Error::NotFound => ApiError::not_found("Calendar not found"),
            other => other.into(),
        })?;

    if !owner && caller.id != user_id {
        return Err(ApiError::forbidden("Only the calendar owner can do this"));
    }

    ShareRegistry::new(store)
        .revoke_by_pair(&calendar_id, &user_id)
        .api_err("Failed to revoke share")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// Lists shares granted to the caller.
pub async fn list_received_shares(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let shares = ShareRegistry::new(state.store.as_ref())
        .list_by_grantee(&auth.user.id)
        .api_err("Failed to list shares")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(shares)))
}

pub async fn get_share(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let share = load_share(store, &id)?;

    require_share_party(store, &auth.user, &share)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(share)))
}

pub async fn update_share(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateShareRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let share = load_share(store, &id)?;

    require_owner(store, &auth.user, &share.calendar_id)?;
    let permission = parse_permission(&req.permission)?;

    let share = ShareRegistry::new(store)
        .update_permission(&share.id, permission)
        .map_err(share_err)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(share)))
}

pub async fn delete_share(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let share = load_share(store, &id)?;

    require_share_party(store, &auth.user, &share)?;

    ShareRegistry::new(store)
        .delete_by_id(&share.id)
        .map_err(share_err)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
