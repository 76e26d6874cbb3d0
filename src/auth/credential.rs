//! OAuth credential value threaded through every provider call.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

/// Tokens that expire within this window are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Upper bound on a lifetime reported by the token endpoint.
const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 3600;

/// Access/refresh token pair plus the access token's expiry.
///
/// A credential is a plain value: it is never cached by the core and each
/// request builds or restores its own.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Build a credential that expires `expires_in_secs` from now.
    pub fn issued_now(
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        expires_in_secs: u64,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .unwrap_or(MAX_LIFETIME_SECS)
            .min(MAX_LIFETIME_SECS);
        let expires_at = Utc::now() + Duration::seconds(lifetime);
        Self::new(access_token, refresh_token, expires_at)
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    /// The long-lived token the caller must keep to resume later.
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}
