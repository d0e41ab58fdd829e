use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::access::ShareRegistry;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    CalendarResponse, CreateCalendarRequest, PaginationParams, UpdateCalendarRequest, non_empty,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt, paginate,
};
use crate::server::validation::{validate_calendar_name, validate_color, validate_description};
use crate::types::{Calendar, DEFAULT_CALENDAR_COLOR};

use super::access::{access_label, require_edit, require_owner, require_view};

/// Lists calendars the caller owns or has been shared, ordered by id.
pub async fn list_calendars(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let user = &auth.user;
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let owned = store
        .list_owned_calendars(&user.id)
        .api_err("Failed to list calendars")?;
    let shared = store
        .list_shared_calendars(&user.id)
        .api_err("Failed to list shared calendars")?;

    let mut calendars: Vec<CalendarResponse> = owned
        .into_iter()
        .map(|calendar| CalendarResponse {
            calendar,
            access: "owner",
            share_count: None,
        })
        .chain(shared.into_iter().map(|(calendar, permission)| CalendarResponse {
            calendar,
            access: permission.as_str(),
            share_count: None,
        }))
        .filter(|c| c.calendar.id.as_str() > cursor)
        .collect();
    calendars.sort_by(|a, b| a.calendar.id.cmp(&b.calendar.id));

    let (calendars, next_cursor, has_more) =
        paginate(calendars, DEFAULT_PAGE_SIZE as usize, |c| c.calendar.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(calendars, next_cursor, has_more)))
}

pub async fn create_calendar(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCalendarRequest>,
) -> impl IntoResponse {
    validate_calendar_name(&req.name)?;
    if let Some(description) = &req.description {
        validate_description(description)?;
    }
    if let Some(color) = &req.color {
        validate_color(color)?;
    }

    let now = Utc::now();
    let calendar = Calendar {
        id: Uuid::new_v4().to_string(),
        owner_id: auth.user.id.clone(),
        name: req.name,
        description: req.description.and_then(non_empty),
        color: req
            .color
            .unwrap_or_else(|| DEFAULT_CALENDAR_COLOR.to_string()),
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_calendar(&calendar)
        .api_err("Failed to create calendar")?;

    tracing::info!(calendar_id = %calendar.id, owner_id = %calendar.owner_id, "Calendar created");

    let response = CalendarResponse {
        calendar,
        access: "owner",
        share_count: Some(0),
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn get_calendar(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = &auth.user;
    let store = state.store.as_ref();

    let calendar = require_view(store, user, &id)?;
    let access = access_label(store, user, &calendar)?;

    let share_count = if calendar.owner_id == user.id {
        Some(
            ShareRegistry::new(store)
                .count_by_calendar(&calendar.id)
                .api_err("Failed to count shares")?,
        )
    } else {
        None
    };

    let response = CalendarResponse {
        calendar,
        access,
        share_count,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

pub async fn update_calendar(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCalendarRequest>,
) -> impl IntoResponse {
    let user = &auth.user;
    let store = state.store.as_ref();

    let mut calendar = require_edit(store, user, &id)?;

    if let Some(name) = req.name {
        validate_calendar_name(&name)?;
        calendar.name = name;
    }
    if let Some(description) = req.description {
        validate_description(&description)?;
        calendar.description = non_empty(description);
    }
    if let Some(color) = req.color {
        validate_color(&color)?;
        calendar.color = color;
    }
    calendar.updated_at = Utc::now();

    store
        .update_calendar(&calendar)
        .api_err("Failed to update calendar")?;

    let access = access_label(store, user, &calendar)?;
    let response = CalendarResponse {
        calendar,
        access,
        share_count: None,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

/// Deletes the calendar together with its shares and events.
pub async fn delete_calendar(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let calendar = require_owner(store, &auth.user, &id)?;

    store
        .delete_calendar(&calendar.id)
        .api_err("Failed to delete calendar")?;

    tracing::info!(calendar_id = %calendar.id, "Calendar deleted");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
