//! WebSocket authentication: validates the JWT presented as a query
//! parameter before any upgrade happens.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use parlor_auth::jwt::JwtDecoder;
use parlor_core::error::AppError;
use parlor_core::types::id::UserId;

/// Verified identity extracted from a presented token.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    /// User ID.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// When the presented token expires.
    pub expires_at: DateTime<Utc>,
}

/// Authenticates WebSocket connections using JWT tokens.
#[derive(Clone)]
pub struct WsAuthenticator {
    /// JWT decoder.
    decoder: Arc<JwtDecoder>,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator").finish()
    }
}

impl WsAuthenticator {
    /// Creates a new WebSocket authenticator.
    pub fn new(decoder: Arc<JwtDecoder>) -> Self {
        Self { decoder }
    }

    /// Authenticates a connection from its query-parameter token.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedSession, AppError> {
        let claims = self.decoder.decode_access_token(token)?;

        Ok(AuthenticatedSession {
            user_id: claims.user_id(),
            username: claims.username.clone(),
            expires_at: claims.expires_at(),
        })
    }
}
