use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{TokenGenerator, parse_token};
use crate::error::Error;
use crate::server::AppState;
use crate::store::Store;
use crate::types::{Token, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UserInactive,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: User,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Validates a raw token string against the store and resolves its user.
/// Tokens of deactivated users are rejected.
pub fn validate_token(
    state: &Arc<AppState>,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if !state
        .tokens
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if let Some(expires_at) = &token.expires_at {
        if expires_at < &Utc::now() {
            return Err(TokenValidationError::TokenExpired);
        }
    }

    let user = state
        .store
        .get_user(&token.user_id)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if !user.active {
        return Err(TokenValidationError::UserInactive);
    }

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) => {
            if let Some(token) = header.strip_prefix("Bearer ") {
                Ok(Some(token.trim().to_string()))
            } else if header.starts_with("Basic ") {
                extract_basic_auth_token(header)
                    .ok_or(TokenValidationError::InvalidToken)
                    .map(Some)
            } else {
                Err(TokenValidationError::InvalidScheme)
            }
        }
        None => Ok(None),
    }
}

/// Generates a token for `user_id`, retrying on the rare lookup-prefix collision.
/// Returns the stored token and the raw secret to hand to the client.
pub fn issue_token(
    state: &AppState,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> crate::error::Result<(Token, String)> {
    issue_token_with(state.store.as_ref(), &state.tokens, user_id, expires_at)
}

pub fn issue_token_with(
    store: &dyn Store,
    generator: &TokenGenerator,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> crate::error::Result<(Token, String)> {
    const MAX_RETRIES: u32 = 3;

    for _ in 0..MAX_RETRIES {
        let (raw_token, lookup, hash) = generator.generate()?;
        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match store.create_token(&token) {
            Ok(()) => return Ok((token, raw_token)),
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(Error::TokenLookupCollision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_extract_bearer_token() {
        let token = extract_token_from_header(Some("Bearer calshare_abc_def")).unwrap();
        assert_eq!(token.as_deref(), Some("calshare_abc_def"));
    }

    #[test]
    fn test_extract_basic_token() {
        let header = format!("Basic {}", STANDARD.encode("x-token:calshare_abc_def"));
        let token = extract_token_from_header(Some(&header)).unwrap();
        assert_eq!(token.as_deref(), Some("calshare_abc_def"));
    }

    #[test]
    fn test_basic_with_other_username_is_invalid() {
        let header = format!("Basic {}", STANDARD.encode("alice:secret"));
        assert!(matches!(
            extract_token_from_header(Some(&header)),
            Err(TokenValidationError::InvalidToken)
        ));
    }

    #[test]
    fn test_unknown_scheme_and_missing_header() {
        assert!(matches!(
            extract_token_from_header(Some("Digest abc")),
            Err(TokenValidationError::InvalidScheme)
        ));
        assert!(extract_token_from_header(None).unwrap().is_none());
    }
}
