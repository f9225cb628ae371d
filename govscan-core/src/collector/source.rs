use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use govscan_model::{AccountId, Credentials, Region, Resource, ResourceKind};
use parking_lot::Mutex;

use crate::error::CollectorError;

/// One pagination call against a listing API.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub account_id: &'a AccountId,
    pub region: &'a Region,
    pub kind: ResourceKind,
    pub cursor: Option<&'a str>,
    pub credentials: &'a Credentials,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub resources: Vec<Resource>,
    pub next_cursor: Option<String>,
}

/// Remote listing API for one resource family. Implementations perform a
/// single network round-trip per call and never retry internally.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn list_page(
        &self,
        request: PageRequest<'_>,
    ) -> Result<Page, CollectorError>;
}

/// Scripted response for one page of a [`StaticInventory`].
#[derive(Debug, Clone)]
pub struct PageSpec {
    failures: VecDeque<CollectorError>,
    outcome: Result<Vec<Resource>, CollectorError>,
    delay: Option<Duration>,
}

impl PageSpec {
    pub fn ok(resources: Vec<Resource>) -> Self {
        Self {
            failures: VecDeque::new(),
            outcome: Ok(resources),
            delay: None,
        }
    }

    pub fn fail(error: CollectorError) -> Self {
        Self {
            failures: VecDeque::new(),
            outcome: Err(error),
            delay: None,
        }
    }

    /// Fails the first `times` calls for this page before the scripted outcome.
    pub fn after_failures(mut self, times: usize, error: CollectorError) -> Self {
        for _ in 0..times {
            self.failures.push_back(error.clone());
        }
        self
    }

    /// Every call for this page takes `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type InventoryKey = (AccountId, Region, ResourceKind);

/// In-memory inventory with scripted pagination, used by tests and the CLI
/// fixture runner. Keys without a script list as empty.
#[derive(Default)]
pub struct StaticInventory {
    pages: Mutex<HashMap<InventoryKey, Vec<PageSpec>>>,
    calls: AtomicUsize,
}

impl fmt::Debug for StaticInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticInventory")
            .field("scripted_listings", &self.pages.lock().len())
            .field("calls", &self.calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `resources` into successful pages of `page_size`.
    pub fn with_resources(
        self,
        account_id: AccountId,
        region: Region,
        kind: ResourceKind,
        resources: Vec<Resource>,
        page_size: usize,
    ) -> Self {
        let pages = resources
            .chunks(page_size.max(1))
            .map(|chunk| PageSpec::ok(chunk.to_vec()))
            .collect();
        self.with_pages(account_id, region, kind, pages)
    }

    pub fn with_pages(
        self,
        account_id: AccountId,
        region: Region,
        kind: ResourceKind,
        pages: Vec<PageSpec>,
    ) -> Self {
        self.pages.lock().insert((account_id, region, kind), pages);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn list_page(
        &self,
        request: PageRequest<'_>,
    ) -> Result<Page, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let index = match request.cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| {
                CollectorError::malformed(format!("unknown cursor {cursor}"))
            })?,
            None => 0,
        };

        let (delay, outcome, total) = {
            let mut pages = self.pages.lock();
            let key = (
                request.account_id.clone(),
                request.region.clone(),
                request.kind,
            );
            let Some(script) = pages.get_mut(&key) else {
                return Ok(Page::default());
            };
            let total = script.len();
            let Some(spec) = script.get_mut(index) else {
                return Ok(Page::default());
            };
            let outcome = match spec.failures.pop_front() {
                Some(error) => Err(error),
                None => spec.outcome.clone(),
            };
            (spec.delay, outcome, total)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let resources = outcome?;
        let next_cursor = (index + 1 < total).then(|| (index + 1).to_string());
        Ok(Page {
            resources,
            next_cursor,
        })
    }
}
