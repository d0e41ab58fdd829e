use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{PaginationParams, RoleRequest, UpdateUserRequest};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_display_name;
use crate::store::Store;
use crate::types::{ROLE_ADMIN, User};

const MAX_ROLE_LEN: usize = 32;

fn load_user(store: &dyn Store, id: &str) -> Result<User, ApiError> {
    store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")
}

fn validate_role(role: &str) -> Result<(), ApiError> {
    let valid = !role.is_empty()
        && role.len() <= MAX_ROLE_LEN
        && role
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::bad_request(
            "Role must be 1-32 lowercase letters, digits, '-' or '_'",
        ));
    }
    Ok(())
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state
        .store
        .list_users(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list users")?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = load_user(state.store.as_ref(), &id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Renames or (de)activates a user. Deactivated users can no longer authenticate.
pub async fn update_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let mut user = load_user(store, &id)?;

    if let Some(name) = req.name {
        validate_display_name(&name)?;
        user.name = name;
    }
    if let Some(active) = req.active {
        if !active && user.id == admin.user.id {
            return Err(ApiError::bad_request("Cannot deactivate your own account"));
        }
        if user.active != active {
            tracing::info!(user_id = %user.id, active, "User activation changed");
        }
        user.active = active;
    }
    user.updated_at = Utc::now();

    store.update_user(&user).api_err("Failed to update user")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Deletes a user along with their calendars, shares and tokens.
pub async fn delete_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id == admin.user.id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    let deleted = state
        .store
        .delete_user(&id)
        .api_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(user_id = %id, deleted_by = %admin.user.id, "User deleted");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn add_role(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    validate_role(&req.role)?;
    let user = load_user(store, &id)?;

    store
        .add_user_role(&user.id, &req.role)
        .api_err("Failed to add role")?;

    tracing::info!(user_id = %user.id, role = %req.role, "Role granted");

    let user = load_user(store, &user.id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn remove_role(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path((id, role)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if id == admin.user.id && role == ROLE_ADMIN {
        return Err(ApiError::bad_request("Cannot remove your own admin role"));
    }

    let user = load_user(store, &id)?;

    let removed = store
        .remove_user_role(&user.id, &role)
        .api_err("Failed to remove role")?;

    if !removed {
        return Err(ApiError::not_found("Role not assigned"));
    }

    tracing::info!(user_id = %user.id, role = %role, "Role revoked");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_role() {
        assert!(validate_role("admin").is_ok());
        assert!(validate_role("calendar-manager_2").is_ok());
        assert!(validate_role("").is_err());
        assert!(validate_role("Admin").is_err());
        assert!(validate_role("has space").is_err());
        assert!(validate_role(&"r".repeat(33)).is_err());
    }
}
