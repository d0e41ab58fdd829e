//! Calendar access control.
//!
//! [`AccessControl`] decides whether a user may view or edit a calendar;
//! [`ShareRegistry`] owns the grant/update/revoke lifecycle of the shares behind
//! those decisions. Both borrow a [`Store`](crate::store::Store) and hold no state
//! of their own.

mod engine;
mod registry;

pub use engine::AccessControl;
pub use registry::ShareRegistry;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::store::{SqliteStore, Store};
    use crate::types::{Calendar, DEFAULT_CALENDAR_COLOR, ROLE_USER, User};

    /// Users u1..u3 and calendars c1, c2, both owned by u1.
    pub struct Fixture {
        _temp: TempDir,
        pub store: SqliteStore,
    }

    impl Fixture {
        pub fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
            store.initialize().unwrap();

            for id in ["u1", "u2", "u3"] {
                store
                    .create_user(&User {
                        id: id.to_string(),
                        email: format!("{id}@example.com"),
                        name: id.to_string(),
                        password_hash: String::new(),
                        active: true,
                        roles: [ROLE_USER.to_string()].into_iter().collect(),
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    })
                    .unwrap();
            }

            for id in ["c1", "c2"] {
                store
                    .create_calendar(&Calendar {
                        id: id.to_string(),
                        owner_id: "u1".to_string(),
                        name: id.to_string(),
                        description: None,
                        color: DEFAULT_CALENDAR_COLOR.to_string(),
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    })
                    .unwrap();
            }

            Self { _temp: temp, store }
        }
    }
}
