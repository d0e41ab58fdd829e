use crate::access::{AccessControl, ShareRegistry};
use crate::error::Error;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::store::Store;
use crate::types::{Calendar, User};

/// The calendar is loaded before any access check, so a missing record there
/// is the user.
fn access_err(e: Error) -> ApiError {
    match e {
        Error::NotFound => ApiError::not_found("User not found"),
        other => other.into(),
    }
}

fn load_calendar(store: &dyn Store, calendar_id: &str) -> Result<Calendar, ApiError> {
    store
        .get_calendar(calendar_id)
        .api_err("Failed to get calendar")?
        .or_not_found("Calendar not found")
}

/// Loads the calendar if the user may view it, returning forbidden if not.
pub fn require_view(
    store: &dyn Store,
    user: &User,
    calendar_id: &str,
) -> Result<Calendar, ApiError> {
    let calendar = load_calendar(store, calendar_id)?;
    let allowed = AccessControl::new(store)
        .has_access(&calendar.id, &user.id)
        .map_err(access_err)?;

    if !allowed {
        tracing::warn!(calendar_id, user_id = %user.id, "View denied");
        return Err(ApiError::forbidden("Insufficient calendar permissions"));
    }
    Ok(calendar)
}

/// Loads the calendar if the user may edit it, returning forbidden if not.
pub fn require_edit(
    store: &dyn Store,
    user: &User,
    calendar_id: &str,
) -> Result<Calendar, ApiError> {
    let calendar = load_calendar(store, calendar_id)?;
    let allowed = AccessControl::new(store)
        .can_edit(&calendar.id, &user.id)
        .map_err(access_err)?;

    if !allowed {
        tracing::warn!(calendar_id, user_id = %user.id, "Edit denied");
        return Err(ApiError::forbidden("Insufficient calendar permissions"));
    }
    Ok(calendar)
}

/// Loads the calendar if the user owns it, returning forbidden if not.
pub fn require_owner(
    store: &dyn Store,
    user: &User,
    calendar_id: &str,
) -> Result<Calendar, ApiError> {
    let calendar = load_calendar(store, calendar_id)?;
    let owner = AccessControl::new(store)
        .is_owner(&calendar.id, &user.id)
        .map_err(access_err)?;

    if !owner {
        tracing::warn!(calendar_id, user_id = %user.id, "Owner action denied");
        return Err(ApiError::forbidden("Only the calendar owner can do this"));
    }
    Ok(calendar)
}

/// The caller's relation to a calendar: `owner`, `edit`, `view`, or `none`.
pub fn access_label(
    store: &dyn Store,
    user: &User,
    calendar: &Calendar,
) -> Result<&'static str, ApiError> {
    if calendar.owner_id == user.id {
        return Ok("owner");
    }

    let share = ShareRegistry::new(store)
        .find_by_pair(&calendar.id, &user.id)
        .api_err("Failed to look up share")?;

    Ok(share.map_or("none", |s| s.permission.as_str()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;

    use super::*;
    use crate::access::fixtures::Fixture;
    use crate::types::SharePermission;

    fn ghost() -> User {
        User {
            id: "ghost".to_string(),
            email: "ghost@example.com".to_string(),
            name: "Ghost".to_string(),
            password_hash: String::new(),
            active: true,
            roles: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_user_is_reported_as_user() {
        let fx = Fixture::new();
        let ghost = ghost();

        for result in [
            require_view(&fx.store, &ghost, "c1"),
            require_edit(&fx.store, &ghost, "c1"),
        ] {
            let err = result.unwrap_err();
            assert_eq!(err.status, StatusCode::NOT_FOUND);
            assert_eq!(err.message, "User not found");
        }
    }

    #[test]
    fn test_unknown_calendar_is_reported_as_calendar() {
        let fx = Fixture::new();
        let u1 = fx.store.get_user("u1").unwrap().unwrap();

        let err = require_view(&fx.store, &u1, "missing").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Calendar not found");
    }

    #[test]
    fn test_view_share_does_not_allow_edit() {
        let fx = Fixture::new();
        let u2 = fx.store.get_user("u2").unwrap().unwrap();
        ShareRegistry::new(&fx.store)
            .grant("c1", "u2", SharePermission::View)
            .unwrap();

        assert!(require_view(&fx.store, &u2, "c1").is_ok());
        assert_eq!(
            require_edit(&fx.store, &u2, "c1").unwrap_err().status,
            StatusCode::FORBIDDEN
        );
        let calendar = fx.store.get_calendar("c1").unwrap().unwrap();
        assert_eq!(access_label(&fx.store, &u2, &calendar).unwrap(), "view");
    }
}
