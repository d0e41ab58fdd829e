mod access;
mod account;
mod calendars;
mod events;
mod shares;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Accounts
        .route("/auth/register", post(account::register))
        .route("/auth/login", post(account::login))
        .route("/auth/logout", post(account::logout))
        .route("/me", get(account::get_me))
        .route("/me", patch(account::update_me))
        // Calendars
        .route("/calendars", get(calendars::list_calendars))
        .route("/calendars", post(calendars::create_calendar))
        .route("/calendars/{id}", get(calendars::get_calendar))
        .route("/calendars/{id}", patch(calendars::update_calendar))
        .route("/calendars/{id}", delete(calendars::delete_calendar))
        // Shares of a calendar
        .route("/calendars/{id}/shares", get(shares::list_calendar_shares))
        .route("/calendars/{id}/shares", post(shares::create_share))
        .route(
            "/calendars/{id}/shares/{user_id}",
            delete(shares::revoke_share),
        )
        // Shares by id
        .route("/shares/received", get(shares::list_received_shares))
        .route("/shares/{id}", get(shares::get_share))
        .route("/shares/{id}", patch(shares::update_share))
        .route("/shares/{id}", delete(shares::delete_share))
        // Events
        .route("/calendars/{id}/events", get(events::list_events))
        .route("/calendars/{id}/events", post(events::create_event))
        .route("/events/{id}", get(events::get_event))
        .route("/events/{id}", patch(events::update_event))
        .route("/events/{id}", delete(events::delete_event))
}
