//! Credential acquisition port.
//!
//! The engine never performs the role-assumption handshake itself; it asks a
//! [`CredentialProvider`] for scoped credentials per (account, region) task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use govscan_model::{AccountId, Credentials, Region};
use tracing::debug;

use crate::error::AuthError;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn acquire(
        &self,
        account_id: &AccountId,
        role_name: &str,
        region: &Region,
    ) -> Result<Credentials, AuthError>;
}

/// Acquires credentials and rejects any that are already expired on arrival.
pub async fn acquire_fresh(
    provider: &dyn CredentialProvider,
    account_id: &AccountId,
    role_name: &str,
    region: &Region,
) -> Result<Credentials, AuthError> {
    let credentials = provider.acquire(account_id, role_name, region).await?;
    if credentials.is_expired(Utc::now()) {
        return Err(AuthError::Expired {
            account_id: account_id.clone(),
        });
    }
    Ok(credentials)
}

/// In-memory provider that grants every account unless told otherwise.
pub struct StaticCredentialProvider {
    denials: HashMap<AccountId, AuthError>,
    ttl: Duration,
    issued: AtomicUsize,
}

impl fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("denied_accounts", &self.denials.len())
            .field("ttl", &self.ttl)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self {
            denials: HashMap::new(),
            ttl: Duration::hours(1),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn deny(mut self, account_id: AccountId, error: AuthError) -> Self {
        self.denials.insert(account_id, error);
        self
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire(
        &self,
        account_id: &AccountId,
        role_name: &str,
        region: &Region,
    ) -> Result<Credentials, AuthError> {
        if let Some(error) = self.denials.get(account_id) {
            return Err(error.clone());
        }

        let serial = self.issued.fetch_add(1, Ordering::Relaxed);
        debug!(
            account_id = %account_id,
            role = role_name,
            region = %region,
            "issuing static credentials"
        );
        Ok(Credentials::new(
            format!("ASIASTATIC{serial:06}"),
            format!("static-secret-{account_id}"),
            format!("static-session-{account_id}-{region}"),
            Utc::now() + self.ttl,
        ))
    }
}
