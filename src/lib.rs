//! # Calshare
//!
//! A calendar sharing server, usable both as a standalone binary and as a library.
//!
//! Calendars belong to exactly one owner. Owners share a calendar with other users
//! at `view` or `edit` level; every read and write of a calendar or its events is
//! authorized through [`access::AccessControl`].
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! calshare = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use calshare::config::ServerConfig;
//! use calshare::server::{AppState, create_router};
//! use calshare::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), &config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `calshare` binary. Disable with `default-features = false`.

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
