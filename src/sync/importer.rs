//! Paginated transaction import.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{with_storage_timeout, SyncError};
use crate::model::{AccountId, DateWindow, PageMode, SyncCounts, Transaction};
use crate::storage::TransactionStore;
use crate::upstream::VendingPlatform;

/// An import that stopped early. `counts` covers the pages committed before
/// the failure; those pages stay committed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ImportFailure {
    pub counts: SyncCounts,
    #[source]
    pub error: SyncError,
}

impl ImportFailure {
    pub fn new(counts: SyncCounts, error: SyncError) -> Self {
        Self { counts, error }
    }
}

impl From<SyncError> for ImportFailure {
    fn from(error: SyncError) -> Self {
        Self::new(SyncCounts::default(), error)
    }
}

/// Pages through an account's transactions and merges each page.
pub struct TransactionImporter {
    platform: Arc<dyn VendingPlatform>,
    transactions: Arc<dyn TransactionStore>,
    page_size: u32,
    storage_timeout: Duration,
}

impl TransactionImporter {
    pub fn new(
        platform: Arc<dyn VendingPlatform>,
        transactions: Arc<dyn TransactionStore>,
        page_size: u32,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            transactions,
            page_size: page_size.max(1),
            storage_timeout,
        }
    }

    /// Import `window` for one account.
    ///
    /// Page 1 is always requested. With [`PageMode::AllPages`] the next page
    /// is requested for as long as the previous one came back full.
    pub async fn import(
        &self,
        account_id: AccountId,
        credential: &str,
        window: DateWindow,
        mode: PageMode,
    ) -> Result<SyncCounts, ImportFailure> {
        let mut counts = SyncCounts::default();
        let mut page = 1u32;

        loop {
            let items = match self
                .platform
                .list_transactions(credential, &window, page, self.page_size)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(account_id, page, error = %e, "Transaction page fetch failed");
                    return Err(ImportFailure::new(counts, e.into()));
                }
            };

            if items.is_empty() {
                break;
            }

            let full_page = items.len() >= self.page_size as usize;
            let rows: Vec<Transaction> = items
                .into_iter()
                .map(|item| item.into_transaction(account_id))
                .collect();

            let page_counts = with_storage_timeout(
                self.storage_timeout,
                self.transactions.upsert_page(&rows, Utc::now()),
            )
            .await
            .map_err(|e| ImportFailure::new(counts, e))?;

            counts.absorb(page_counts);
            debug!(
                account_id,
                page,
                added = page_counts.added,
                updated = page_counts.updated,
                "Transaction page merged"
            );

            if mode == PageMode::FirstPageOnly || !full_page {
                break;
            }
            page += 1;
        }

        info!(
            account_id,
            from = %window.from,
            to = %window.to,
            processed = counts.processed,
            added = counts.added,
            updated = counts.updated,
            "Transactions imported"
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStore;
    use crate::test_utils::{date, upstream_transaction, MockVendingPlatform};
    use crate::upstream::UpstreamError;

    const PAGE: u32 = 2;

    fn window() -> DateWindow {
        DateWindow::new(date(2024, 5, 1), date(2024, 5, 2))
    }

    fn importer(platform: &Arc<MockVendingPlatform>, store: &Arc<MockStore>) -> TransactionImporter {
        TransactionImporter::new(platform.clone(), store.clone(), PAGE, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_all_pages_until_short_page() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![
                vec![upstream_transaction(1, None), upstream_transaction(2, None)],
                vec![upstream_transaction(3, None), upstream_transaction(4, None)],
                vec![upstream_transaction(5, None)],
            ])
            .await;
        let store = Arc::new(MockStore::new());

        let counts = importer(&platform, &store)
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap();

        assert_eq!(platform.transaction_calls(), 3);
        assert_eq!(counts, SyncCounts { processed: 5, added: 5, updated: 0 });
    }

    #[tokio::test]
    async fn test_full_last_page_fetches_one_empty_page() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![vec![
                upstream_transaction(1, None),
                upstream_transaction(2, None),
            ]])
            .await;
        let store = Arc::new(MockStore::new());

        let counts = importer(&platform, &store)
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap();

        assert_eq!(platform.transaction_calls(), 2);
        assert_eq!(counts.processed, 2);
    }

    #[tokio::test]
    async fn test_first_page_only() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![
                vec![upstream_transaction(1, None), upstream_transaction(2, None)],
                vec![upstream_transaction(3, None)],
            ])
            .await;
        let store = Arc::new(MockStore::new());

        let counts = importer(&platform, &store)
            .import(1, "token", window(), PageMode::FirstPageOnly)
            .await
            .unwrap();

        assert_eq!(platform.transaction_calls(), 1);
        assert_eq!(counts.processed, 2);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let platform = Arc::new(MockVendingPlatform::new());
        let store = Arc::new(MockStore::new());

        let counts = importer(&platform, &store)
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap();

        assert_eq!(platform.transaction_calls(), 1);
        assert_eq!(counts, SyncCounts::default());
    }

    #[tokio::test]
    async fn test_second_import_only_updates() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![vec![upstream_transaction(1, Some(42))]])
            .await;
        let store = Arc::new(MockStore::new());
        let importer = importer(&platform, &store);

        importer
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap();
        let second = importer
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap();

        assert_eq!(second, SyncCounts { processed: 1, added: 0, updated: 1 });
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_counts() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![
                vec![upstream_transaction(1, None), upstream_transaction(2, None)],
                vec![upstream_transaction(3, None), upstream_transaction(4, None)],
            ])
            .await;
        platform
            .fail_transaction_page(2, UpstreamError::Transient("reset".to_string()))
            .await;
        let store = Arc::new(MockStore::new());

        let failure = importer(&platform, &store)
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap_err();

        assert_eq!(failure.counts.processed, 2);
        assert!(matches!(
            failure.error,
            SyncError::Upstream(UpstreamError::Transient(_))
        ));
        // Page 1 stays committed.
        assert_eq!(store.transaction_count().await, 2);
    }

    #[tokio::test]
    async fn test_storage_failure_reported() {
        let platform = Arc::new(MockVendingPlatform::new());
        platform
            .set_transaction_pages(vec![vec![upstream_transaction(1, None)]])
            .await;
        let store = Arc::new(MockStore::new());
        store.set_fail_on_transactions(true).await;

        let failure = importer(&platform, &store)
            .import(1, "token", window(), PageMode::AllPages)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, SyncError::Storage(_)));
        assert_eq!(failure.counts, SyncCounts::default());
    }
}
