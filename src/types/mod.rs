mod models;
mod permission;

pub use models::*;
pub use permission::{ROLE_ADMIN, ROLE_USER, SharePermission};
