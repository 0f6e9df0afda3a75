use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use super::{CryptError, CryptResult, process_token};

/// The signed-in learner, as seen by the persistence layer. Row-level
/// security scopes every read and write to `user_id`.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: Uuid,
    access_token: String,
    email: Option<String>,
    username: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
            email: None,
            username: None,
            expires_at,
        }
    }

    pub fn from_access_token(token: &str, secret: Option<&str>) -> CryptResult<Self> {
        let data = process_token(token, secret.map(str::as_bytes))?;
        let claims = data.claims;

        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| CryptError::InvalidSubject(claims.sub.clone()))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(CryptError::SessionExpired)?;

        Ok(Self {
            user_id,
            access_token: token.to_string(),
            email: claims.email,
            username: claims.user_metadata.username,
            expires_at,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Claims in the shape `auth.uid()` reads from `request.jwt.claims`.
    pub fn claims_json(&self) -> serde_json::Value {
        json!({
            "sub": self.user_id,
            "role": "authenticated",
            "email": self.email,
            "exp": self.expires_at.timestamp(),
        })
    }
}
