//! Paginated inventory discovery across the AI/ML resource families.

pub mod backoff;
pub mod source;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use govscan_model::{AccountId, Credentials, Region, Resource, ResourceKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use backoff::Backoff;
pub use source::{InventorySource, Page, PageRequest, PageSpec, StaticInventory};

use crate::config::{EngineConfig, RetryConfig};
use crate::error::CollectorError;

/// Drives an [`InventorySource`] through every resource family, one page at
/// a time, retrying transient failures per page.
pub struct InventoryCollector {
    source: Arc<dyn InventorySource>,
    retry: RetryConfig,
    backoff: Backoff,
    request_timeout: Duration,
}

impl fmt::Debug for InventoryCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryCollector")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl InventoryCollector {
    pub fn new(source: Arc<dyn InventorySource>, config: &EngineConfig) -> Self {
        Self {
            source,
            retry: config.retry,
            backoff: Backoff::new(config.retry),
            request_timeout: config.request_timeout(),
        }
    }

    /// Lazily lists every resource visible to `credentials` in one
    /// (account, region).
    ///
    /// The stream ends after the first error it yields, and ends silently
    /// once `cancel` fires between pages or during a backoff sleep. Every
    /// call starts again from the first page of the first family.
    pub fn collect<'a>(
        &'a self,
        account_id: &'a AccountId,
        region: &'a Region,
        credentials: &'a Credentials,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<Resource, CollectorError>> + Send + 'a {
        stream! {
            for kind in ResourceKind::ALL {
                let mut cursor: Option<String> = None;
                let mut page_number: usize = 0;
                loop {
                    if cancel.is_cancelled() {
                        debug!(
                            account_id = %account_id,
                            region = %region,
                            kind = %kind,
                            "collection cancelled between pages"
                        );
                        return;
                    }

                    page_number += 1;
                    let request = PageRequest {
                        account_id,
                        region,
                        kind,
                        cursor: cursor.as_deref(),
                        credentials,
                    };
                    let page = match self.fetch_page(request, page_number, cancel).await {
                        Ok(Some(page)) => page,
                        Ok(None) => return,
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    };

                    for resource in page.resources {
                        yield Ok(resource);
                    }

                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
            }
        }
    }

    /// Fetches one page, retrying transient failures. `Ok(None)` means the
    /// token fired while waiting to retry.
    async fn fetch_page(
        &self,
        request: PageRequest<'_>,
        page_number: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Page>, CollectorError> {
        let max_attempts = self.retry.max_attempts_per_page.max(1);
        let mut attempt: u16 = 1;

        loop {
            if request.credentials.is_expired(Utc::now()) {
                return Err(CollectorError::credentials_expired(format!(
                    "credentials for account {} expired mid-collection",
                    request.account_id
                )));
            }

            let outcome = match tokio::time::timeout(
                self.request_timeout,
                self.source.list_page(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(CollectorError::timeout(format!(
                    "{} listing exceeded {:?}",
                    request.kind, self.request_timeout
                ))),
            };

            let err = match outcome {
                Ok(page) => return Ok(Some(page)),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                warn!(
                    account_id = %request.account_id,
                    region = %request.region,
                    kind = %request.kind,
                    page = page_number,
                    attempt,
                    error = %err,
                    "inventory listing failed"
                );
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                account_id = %request.account_id,
                region = %request.region,
                kind = %request.kind,
                page = page_number,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying inventory page"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
