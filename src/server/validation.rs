use chrono::{DateTime, Utc};

use crate::server::response::ApiError;

const MAX_EMAIL_LEN: usize = 254;
const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_CALENDAR_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_EVENT_TITLE_LEN: usize = 200;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

fn validate_text(value: &str, field: &str, max_len: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.chars().count() > max_len {
        return Err(format!("{field} cannot exceed {max_len} characters"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request("Email is missing or too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("Email cannot contain whitespace"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(ApiError::bad_request("Email address is not valid")),
    }
}

pub fn validate_display_name(name: &str) -> Result<(), ApiError> {
    validate_text(name, "Name", MAX_DISPLAY_NAME_LEN).map_err(ApiError::bad_request)
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password cannot exceed {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_calendar_name(name: &str) -> Result<(), ApiError> {
    validate_text(name, "Calendar name", MAX_CALENDAR_NAME_LEN).map_err(ApiError::bad_request)
}

pub fn validate_description(description: &str) -> Result<(), ApiError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// Colors are `#RRGGBB` hex strings.
pub fn validate_color(color: &str) -> Result<(), ApiError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ApiError::bad_request("Color must be in #RRGGBB format"));
    }
    Ok(())
}

pub fn validate_event_title(title: &str) -> Result<(), ApiError> {
    validate_text(title, "Event title", MAX_EVENT_TITLE_LEN).map_err(ApiError::bad_request)
}

pub fn validate_event_range(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<(), ApiError> {
    if end < start {
        return Err(ApiError::bad_request("Event end cannot be before its start"));
    }
    Ok(())
}
