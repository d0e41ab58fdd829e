use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{EventQuery, Store};
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "id, email, name, password_hash, active, created_at, updated_at";
const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";
const CALENDAR_COLUMNS: &str = "id, owner_id, name, description, color, created_at, updated_at";
const SHARE_COLUMNS: &str = "id, calendar_id, grantee_id, permission, created_at";
const EVENT_COLUMNS: &str = "id, calendar_id, title, description, location, start_at, end_at, \
                             all_day, recurrence, created_by, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

// Fixed width so that lexical order in SQL matches chronological order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Maps constraint failures on insert to domain errors.
fn map_insert_error(e: rusqlite::Error, conflict: &str) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            match err.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Error::Conflict(conflict.to_string()),
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::NotFound,
                _ => Error::Database(rusqlite::Error::SqliteFailure(err, msg)),
            }
        }
        e => Error::from(e),
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        active: row.get(4)?,
        roles: BTreeSet::new(),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

fn calendar_from_row(row: &Row<'_>) -> rusqlite::Result<Calendar> {
    Ok(Calendar {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn parse_permission(idx: usize, raw: String) -> rusqlite::Result<SharePermission> {
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn share_from_row(row: &Row<'_>) -> rusqlite::Result<Share> {
    Ok(Share {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        grantee_id: row.get(2)?,
        permission: parse_permission(3, row.get(3)?)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        start_at: parse_datetime(&row.get::<_, String>(5)?),
        end_at: parse_datetime(&row.get::<_, String>(6)?),
        all_day: row.get(7)?,
        recurrence: row.get(8)?,
        created_by: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn load_roles(conn: &Connection, user_id: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
    rows.collect::<std::result::Result<BTreeSet<_>, _>>()
        .map_err(Error::from)
}

fn with_roles(conn: &Connection, user: Option<User>) -> Result<Option<User>> {
    match user {
        Some(mut user) => {
            user.roles = load_roles(conn, &user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO users (id, email, name, password_hash, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.email,
                user.name,
                user.password_hash,
                user.active,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        )
        .map_err(|e| map_insert_error(e, "email already registered"))?;

        for role in &user.roles {
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                params![user.id, role],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        with_roles(&conn, user)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?;
        with_roles(&conn, user)
    }

    fn exists_by_email(&self, email: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;

        let users = stmt
            .query_map(params![cursor, limit], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        users
            .into_iter()
            .map(|mut user| {
                user.roles = load_roles(&conn, &user.id)?;
                Ok(user)
            })
            .collect()
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET name = ?1, password_hash = ?2, active = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                user.name,
                user.password_hash,
                user.active,
                format_datetime(&user.updated_at),
                user.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn add_user_role(&self, user_id: &str, role: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                params![user_id, role],
            )
            .map_err(|e| map_insert_error(e, "role already assigned"))?;
        Ok(())
    }

    fn remove_user_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM user_roles WHERE user_id = ?1 AND role = ?2",
            params![user_id, role],
        )?;
        Ok(rows > 0)
    }

    fn has_user_with_role(&self, role: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_roles WHERE role = ?1",
            params![role],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => match map_insert_error(e, "token lookup") {
                Error::Conflict(_) => Err(Error::TokenLookupCollision),
                other => Err(other),
            },
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], token_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Calendar operations

    fn create_calendar(&self, calendar: &Calendar) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO calendars (id, owner_id, name, description, color, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    calendar.id,
                    calendar.owner_id,
                    calendar.name,
                    calendar.description,
                    calendar.color,
                    format_datetime(&calendar.created_at),
                    format_datetime(&calendar.updated_at),
                ],
            )
            .map_err(|e| map_insert_error(e, "calendar already exists"))?;
        Ok(())
    }

    fn get_calendar(&self, id: &str) -> Result<Option<Calendar>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {CALENDAR_COLUMNS} FROM calendars WHERE id = ?1"),
            params![id],
            calendar_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_owned_calendars(&self, owner_id: &str) -> Result<Vec<Calendar>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CALENDAR_COLUMNS} FROM calendars WHERE owner_id = ?1 ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![owner_id], calendar_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_shared_calendars(&self, grantee_id: &str) -> Result<Vec<(Calendar, SharePermission)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.owner_id, c.name, c.description, c.color, c.created_at, c.updated_at,
                    s.permission
             FROM calendars c
             JOIN shares s ON s.calendar_id = c.id
             WHERE s.grantee_id = ?1
             ORDER BY c.id",
        )?;

        let rows = stmt.query_map(params![grantee_id], |row| {
            Ok((calendar_from_row(row)?, parse_permission(7, row.get(7)?)?))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_calendar(&self, calendar: &Calendar) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE calendars SET name = ?1, description = ?2, color = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                calendar.name,
                calendar.description,
                calendar.color,
                format_datetime(&calendar.updated_at),
                calendar.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_calendar(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM calendars WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Share operations

    fn create_share(&self, share: &Share) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO shares (id, calendar_id, grantee_id, permission, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    share.id,
                    share.calendar_id,
                    share.grantee_id,
                    share.permission.as_str(),
                    format_datetime(&share.created_at),
                ],
            )
            .map_err(|e| map_insert_error(e, "calendar is already shared with this user"))?;
        Ok(())
    }

    fn get_share(&self, id: &str) -> Result<Option<Share>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SHARE_COLUMNS} FROM shares WHERE id = ?1"),
            params![id],
            share_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_shares_by_calendar(&self, calendar_id: &str) -> Result<Vec<Share>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS} FROM shares WHERE calendar_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![calendar_id], share_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_shares_by_grantee(&self, grantee_id: &str) -> Result<Vec<Share>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS} FROM shares WHERE grantee_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![grantee_id], share_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn find_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<Option<Share>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SHARE_COLUMNS} FROM shares WHERE calendar_id = ?1 AND grantee_id = ?2"
            ),
            params![calendar_id, grantee_id],
            share_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn exists_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM shares WHERE calendar_id = ?1 AND grantee_id = ?2",
            params![calendar_id, grantee_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn update_share_permission(&self, id: &str, permission: SharePermission) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE shares SET permission = ?1 WHERE id = ?2",
            params![permission.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    fn delete_share(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM shares WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_share_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM shares WHERE calendar_id = ?1 AND grantee_id = ?2",
            params![calendar_id, grantee_id],
        )?;
        Ok(rows > 0)
    }

    fn count_shares_by_calendar(&self, calendar_id: &str) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM shares WHERE calendar_id = ?1",
            params![calendar_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // Event operations

    fn create_event(&self, event: &Event) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO events (id, calendar_id, title, description, location, start_at, end_at,
                                     all_day, recurrence, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.id,
                    event.calendar_id,
                    event.title,
                    event.description,
                    event.location,
                    format_datetime(&event.start_at),
                    format_datetime(&event.end_at),
                    event.all_day,
                    event.recurrence,
                    event.created_by,
                    format_datetime(&event.created_at),
                    format_datetime(&event.updated_at),
                ],
            )
            .map_err(|e| map_insert_error(e, "event already exists"))?;
        Ok(())
    }

    fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id],
            event_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_events(&self, calendar_id: &str, query: &EventQuery) -> Result<Vec<Event>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE calendar_id = ?1
               AND (?2 IS NULL OR end_at > ?2)
               AND (?3 IS NULL OR start_at < ?3)
               AND (?4 IS NULL OR (start_at, id) > (SELECT start_at, id FROM events WHERE id = ?4))
             ORDER BY start_at, id
             LIMIT ?5"
        ))?;

        let rows = stmt.query_map(
            params![
                calendar_id,
                query.from.as_ref().map(format_datetime),
                query.to.as_ref().map(format_datetime),
                query.cursor,
                query.limit,
            ],
            event_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_event(&self, event: &Event) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE events SET title = ?1, description = ?2, location = ?3, start_at = ?4,
                               end_at = ?5, all_day = ?6, recurrence = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                event.title,
                event.description,
                event.location,
                format_datetime(&event.start_at),
                format_datetime(&event.end_at),
                event.all_day,
                event.recurrence,
                format_datetime(&event.updated_at),
                event.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_event(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
