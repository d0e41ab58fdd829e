use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Calendar;

// Accounts

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

// Calendars

#[derive(Debug, Deserialize)]
pub struct CreateCalendarRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// An empty `description` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCalendarRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// A calendar as seen by the caller.
#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    #[serde(flatten)]
    pub calendar: Calendar,
    /// `owner`, `edit` or `view`.
    pub access: &'static str,
    /// Only reported to the owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_count: Option<u64>,
}

// Shares

/// Identifies the grantee by id or by email. The permission is parsed
/// server-side so unknown levels surface as a 400.
#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default)]
    pub grantee_id: Option<String>,
    #[serde(default)]
    pub grantee_email: Option<String>,
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateShareRequest {
    pub permission: String,
}

// Events

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub recurrence: Option<String>,
}

/// Empty `description`, `location` or `recurrence` clear the field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: Option<bool>,
    #[serde(default)]
    pub recurrence: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i32>,
}

// Shared

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

// Administration

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

/// Maps an empty string to `None`, for fields that can be cleared.
pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
