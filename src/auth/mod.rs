mod helpers;
mod middleware;
mod password;
mod token;

pub use helpers::{issue_token, issue_token_with};
pub use middleware::{AuthError, RequireAdmin, RequireUser};
pub use password::{hash_password, verify_password};
pub use token::{TokenGenerator, parse_token};
