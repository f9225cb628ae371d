//! Persistence port consumed by the engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use govscan_model::{Account, AccountId, JobId, ScanResult};
use parking_lot::{Mutex, RwLock};

use crate::error::StorageError;

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn persist(&self, result: &ScanResult) -> Result<(), StorageError>;

    async fn load_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Account, StorageError>;
}

/// Process-local store used by tests and the CLI fixture runner.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    results: RwLock<HashMap<JobId, ScanResult>>,
    persist_attempts: AtomicUsize,
    unavailable: AtomicBool,
    persist_delay: Mutex<Duration>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("accounts", &self.accounts.read().len())
            .field("results", &self.results.read().len())
            .field(
                "persist_attempts",
                &self.persist_attempts.load(Ordering::Relaxed),
            )
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .field("persist_delay", &*self.persist_delay.lock())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = Account>,
    {
        let store = Self::new();
        for account in accounts {
            store.register_account(account);
        }
        store
    }

    pub fn register_account(&self, account: Account) {
        self.accounts
            .write()
            .insert(account.account_id.clone(), account);
    }

    /// Makes every subsequent `persist` call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every subsequent `persist` call by `delay`.
    pub fn set_persist_delay(&self, delay: Duration) {
        *self.persist_delay.lock() = delay;
    }

    pub fn persisted(&self, job_id: &JobId) -> Option<ScanResult> {
        self.results.read().get(job_id).cloned()
    }

    pub fn persist_attempts(&self) -> usize {
        self.persist_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanStore for InMemoryStore {
    async fn persist(&self, result: &ScanResult) -> Result<(), StorageError> {
        self.persist_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.persist_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        self.results.write().insert(result.job_id, result.clone());
        Ok(())
    }

    async fn load_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Account, StorageError> {
        self.accounts
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(account_id.clone()))
    }
}
