//! Handshake authentication for the gateway
//!
//! A connection must present a `userId` and a `token`, either as query
//! parameters or with the token in an `Authorization: Bearer` header:
//!
//! ```bash
//! websocat "ws://localhost:3030/ws?userId=alice&token=eyJhbGciOiJIUzI1NiIs..."
//! ```
//!
//! By default the token is only required to be present and the user id is
//! trusted as supplied by the identity provider. When a secret is configured
//! the token must be an HS256 JWT whose `sub` claim equals the user id.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;
use crate::types::UserId;
use crate::utils::current_timestamp;

/// Query parameters of the upgrade request
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// JWT claims accepted at handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = current_timestamp();
        Self {
            sub: user_id.into(),
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

/// An authenticated handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Verifies handshake credentials
pub struct HandshakeVerifier {
    jwt: Option<JwtKeys>,
}

impl HandshakeVerifier {
    /// Accept any non-empty token
    pub fn trusting() -> Self {
        Self { jwt: None }
    }

    /// Require HS256 tokens signed with `secret`
    pub fn with_secret(secret: &str) -> Self {
        Self {
            jwt: Some(JwtKeys {
                encoding_key: EncodingKey::from_secret(secret.as_bytes()),
                decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            }),
        }
    }

    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => Self::with_secret(secret),
            None => Self::trusting(),
        }
    }

    pub fn verifies_tokens(&self) -> bool {
        self.jwt.is_some()
    }

    /// Check the handshake credentials.
    ///
    /// `authorization` is the raw `Authorization` header, used when the query
    /// carries no token. Supports `"Bearer <token>"` or just `"<token>"`.
    pub fn authenticate(
        &self,
        params: &HandshakeParams,
        authorization: Option<&str>,
    ) -> Result<Identity, HandshakeError> {
        let user_id = params
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(HandshakeError::MissingUserId)?;

        let token = params
            .token
            .as_deref()
            .or_else(|| authorization.map(|h| h.strip_prefix("Bearer ").unwrap_or(h)))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(HandshakeError::MissingToken)?;

        if let Some(keys) = &self.jwt {
            let claims = decode::<Claims>(token, &keys.decoding_key, &Validation::default())
                .map_err(|e| HandshakeError::InvalidToken(e.to_string()))?
                .claims;
            if claims.sub != user_id {
                return Err(HandshakeError::SubjectMismatch {
                    subject: claims.sub,
                    user_id: user_id.to_string(),
                });
            }
        }

        Ok(Identity {
            user_id: user_id.to_string(),
        })
    }

    /// Issue a token for a user. Only meaningful when a secret is configured;
    /// a trusting verifier returns an opaque placeholder token.
    pub fn issue_token(&self, user_id: &str, ttl_seconds: i64) -> Result<String, HandshakeError> {
        match &self.jwt {
            Some(keys) => encode(&Header::default(), &Claims::new(user_id, ttl_seconds), &keys.encoding_key)
                .map_err(|e| HandshakeError::InvalidToken(e.to_string())),
            None => Ok(format!("session-{}", user_id)),
        }
    }
}
