use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateEventRequest, ListEventsParams, UpdateEventRequest, non_empty};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PaginatedResponse, StoreOptionExt,
    StoreResultExt, paginate,
};
use crate::server::validation::{validate_description, validate_event_range, validate_event_title};
use crate::store::{EventQuery, Store};
use crate::types::{Event, User};

use super::access::{require_edit, require_view};

/// Loads an event the user can see. Events on calendars without view access
/// are reported as missing.
fn load_visible_event(store: &dyn Store, user: &User, id: &str) -> Result<Event, ApiError> {
    let event = store
        .get_event(id)
        .api_err("Failed to get event")?
        .or_not_found("Event not found")?;

    match require_view(store, user, &event.calendar_id) {
        Ok(_) => Ok(event),
        Err(e) if e.status == StatusCode::FORBIDDEN => {
            Err(ApiError::not_found("Event not found"))
        }
        Err(e) => Err(e),
    }
}

/// Lists events overlapping `[from, to)`, ordered by start time.
pub async fn list_events(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(calendar_id): Path<String>,
    Query(params): Query<ListEventsParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let calendar = require_view(store, &auth.user, &calendar_id)?;

    if let (Some(from), Some(to)) = (&params.from, &params.to) {
        if to < from {
            return Err(ApiError::bad_request("'to' cannot be before 'from'"));
        }
    }

    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let query = EventQuery {
        from: params.from,
        to: params.to,
        cursor: params.cursor,
        limit: limit + 1,
    };

    let events = store
        .list_events(&calendar.id, &query)
        .api_err("Failed to list events")?;

    let (events, next_cursor, has_more) = paginate(events, limit as usize, |e| e.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(events, next_cursor, has_more)))
}

pub async fn create_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(calendar_id): Path<String>,
    Json(req): Json<CreateEventRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let calendar = require_edit(store, &auth.user, &calendar_id)?;

    validate_event_title(&req.title)?;
    validate_event_range(&req.start_at, &req.end_at)?;
    if let Some(description) = &req.description {
        validate_description(description)?;
    }

    let now = Utc::now();
    let event = Event {
        id: Uuid::new_v4().to_string(),
        calendar_id: calendar.id,
        title: req.title,
        description: req.description.and_then(non_empty),
        location: req.location.and_then(non_empty),
        start_at: req.start_at,
        end_at: req.end_at,
        all_day: req.all_day,
        recurrence: req.recurrence.and_then(non_empty),
        created_by: auth.user.id.clone(),
        created_at: now,
        updated_at: now,
    };

    store.create_event(&event).api_err("Failed to create event")?;

    tracing::debug!(event_id = %event.id, calendar_id = %event.calendar_id, "Event created");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

pub async fn get_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let event = load_visible_event(store, &auth.user, &id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(event)))
}

pub async fn update_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let mut event = load_visible_event(store, &auth.user, &id)?;

    require_edit(store, &auth.user, &event.calendar_id)?;

    if let Some(title) = req.title {
        validate_event_title(&title)?;
        event.title = title;
    }
    if let Some(description) = req.description {
        validate_description(&description)?;
        event.description = non_empty(description);
    }
    if let Some(location) = req.location {
        event.location = non_empty(location);
    }
    if let Some(start_at) = req.start_at {
        event.start_at = start_at;
    }
    if let Some(end_at) = req.end_at {
        event.end_at = end_at;
    }
    if let Some(all_day) = req.all_day {
        event.all_day = all_day;
    }
    if let Some(recurrence) = req.recurrence {
        event.recurrence = non_empty(recurrence);
    }
    validate_event_range(&event.start_at, &event.end_at)?;
    event.updated_at = Utc::now();

    store.update_event(&event).api_err("Failed to update event")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(event)))
}

pub async fn delete_event(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let event = load_visible_event(store, &auth.user, &id)?;

    require_edit(store, &auth.user, &event.calendar_id)?;

    store.delete_event(&event.id).api_err("Failed to delete event")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
