mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Optional time window and cursor for listing a calendar's events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Only events ending after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only events starting before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Id of the last event of the previous page.
    pub cursor: Option<String>,
    pub limit: i32,
}

/// Store defines the database interface.
///
/// Share mutations are single statements. Creating a share that collides with an
/// existing (calendar, grantee) pair fails with `Error::Conflict`.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations (identity store)
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn exists_by_email(&self, email: &str) -> Result<bool>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn add_user_role(&self, user_id: &str, role: &str) -> Result<()>;
    fn remove_user_role(&self, user_id: &str, role: &str) -> Result<bool>;
    fn has_user_with_role(&self, role: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Calendar operations (calendar store)
    fn create_calendar(&self, calendar: &Calendar) -> Result<()>;
    fn get_calendar(&self, id: &str) -> Result<Option<Calendar>>;
    fn list_owned_calendars(&self, owner_id: &str) -> Result<Vec<Calendar>>;
    fn list_shared_calendars(&self, grantee_id: &str) -> Result<Vec<(Calendar, SharePermission)>>;
    fn update_calendar(&self, calendar: &Calendar) -> Result<()>;
    fn delete_calendar(&self, id: &str) -> Result<bool>;

    // Share operations (share registry storage)
    fn create_share(&self, share: &Share) -> Result<()>;
    fn get_share(&self, id: &str) -> Result<Option<Share>>;
    fn list_shares_by_calendar(&self, calendar_id: &str) -> Result<Vec<Share>>;
    fn list_shares_by_grantee(&self, grantee_id: &str) -> Result<Vec<Share>>;
    fn find_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<Option<Share>>;
    fn exists_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<bool>;
    fn update_share_permission(&self, id: &str, permission: SharePermission) -> Result<bool>;
    fn delete_share(&self, id: &str) -> Result<bool>;
    fn delete_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<bool>;
    fn count_shares_by_calendar(&self, calendar_id: &str) -> Result<u64>;

    // Event operations
    fn create_event(&self, event: &Event) -> Result<()>;
    fn get_event(&self, id: &str) -> Result<Option<Event>>;
    fn list_events(&self, calendar_id: &str, query: &EventQuery) -> Result<Vec<Event>>;
    fn update_event(&self, event: &Event) -> Result<()>;
    fn delete_event(&self, id: &str) -> Result<bool>;
}
