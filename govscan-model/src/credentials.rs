use std::fmt;

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Scoped, time-limited credentials for one account.
///
/// Held only by the task that acquired them. Never serialized; the secret
/// material is wiped when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expires_at,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials::new(
            "ASIAEXAMPLE",
            "super-secret",
            "session-token",
            Utc::now() + Duration::minutes(15),
        );
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("ASIAEXAMPLE"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("session-token"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let creds = Credentials::new("a", "b", "c", now);
        assert!(creds.is_expired(now));
        assert!(!creds.is_expired(now - Duration::seconds(1)));
    }
}
