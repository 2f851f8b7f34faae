//! Paginated listing into base records.

use super::{dismiss_consent, site};
use crate::core::config::{HarvestSettings, SourceConfig};
use crate::core::document::{PageDocument, Record};
use crate::core::error::HarvestError;
use crate::core::fund::FundBase;
use crate::core::normalize;
use crate::core::repository::{FundRepository, UpsertOutcome};
use crate::core::verify::{PageCheck, PageNumberVerifier};
use tracing::{debug, error, info, warn};

/// Outcome of a listing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReport {
    pub total_funds: u64,
    pub pages_total: u32,
    pub pages_done: u32,
    /// Pages given up after exhausting their attempts.
    pub failed_pages: Vec<u32>,
    pub inserted: usize,
    pub updated: usize,
    /// Rows without a usable detail link.
    pub skipped_rows: usize,
    pub write_failures: usize,
}

#[derive(Debug, Default)]
struct PageCounts {
    inserted: usize,
    updated: usize,
    skipped_rows: usize,
    write_failures: usize,
}

pub struct ListHarvester<'a> {
    document: &'a dyn PageDocument,
    repository: &'a dyn FundRepository,
    source: &'a SourceConfig,
    settings: &'a HarvestSettings,
}

impl<'a> ListHarvester<'a> {
    pub fn new(
        document: &'a dyn PageDocument,
        repository: &'a dyn FundRepository,
        source: &'a SourceConfig,
        settings: &'a HarvestSettings,
    ) -> Self {
        Self {
            document,
            repository,
            source,
            settings,
        }
    }

    /// Discovers the number of funds from the first listing page, then harvests every page.
    pub async fn run(&self) -> Result<ListReport, HarvestError> {
        let total = self.discover_total().await?;
        Ok(self.harvest(total).await)
    }

    /// Reads the result counter of the first listing page, e.g. `4.123`.
    pub async fn discover_total(&self) -> Result<u64, HarvestError> {
        let url = self.source.list_url(1);
        self.document.navigate(&url).await?;
        dismiss_consent(self.document).await;

        let policy = self.settings.table_wait();
        let outcome = policy
            .wait_until(|| self.document.exists(site::list::RESULT_COUNT))
            .await?;
        if !outcome.is_ready() {
            return Err(HarvestError::VerificationTimeout {
                what: format!("Result counter `{}`", site::list::RESULT_COUNT),
                waited: policy.max_wait,
            });
        }

        let text = self
            .document
            .query_one(site::list::RESULT_COUNT)
            .await?
            .unwrap_or_default();
        let total = normalize::parse_count("result_count", &text)?.max(0) as u64;
        info!("Found {} funds", total);
        Ok(total)
    }

    /// Harvests pages `1..=ceil(total / page_size)`. Each page is retried until its
    /// rendered page number matches or `max_page_attempts` is used up; a failed page is
    /// reported and skipped, never fatal to the run.
    pub async fn harvest(&self, total: u64) -> ListReport {
        let pages = site::page_count(total, self.source.page_size);
        let max_attempts = self.settings.max_page_attempts.max(1);
        let mut report = ListReport {
            total_funds: total,
            pages_total: pages,
            ..Default::default()
        };

        for page in 1..=pages {
            let expected_rows = self.expected_rows(page, total);
            let mut counts = None;
            for attempt in 1..=max_attempts {
                match self.harvest_page(page, expected_rows).await {
                    Ok(Some(page_counts)) => {
                        counts = Some(page_counts);
                        break;
                    }
                    Ok(None) => {
                        warn!("Redoing page {} (attempt {}/{})", page, attempt, max_attempts)
                    }
                    Err(e) => warn!(
                        "Page {} failed (attempt {}/{}): {}",
                        page, attempt, max_attempts, e
                    ),
                }
            }

            match counts {
                Some(counts) => {
                    info!(
                        "Page {}/{}: {} inserted, {} updated",
                        page, pages, counts.inserted, counts.updated
                    );
                    report.pages_done += 1;
                    report.inserted += counts.inserted;
                    report.updated += counts.updated;
                    report.skipped_rows += counts.skipped_rows;
                    report.write_failures += counts.write_failures;
                }
                None => {
                    error!("Giving up on page {} after {} attempts", page, max_attempts);
                    report.failed_pages.push(page);
                }
            }
        }

        info!(
            "Listing done: {}/{} pages, {} inserted, {} updated",
            report.pages_done, report.pages_total, report.inserted, report.updated
        );
        report
    }

    /// Rows a fully rendered page shows; only the last page is short.
    fn expected_rows(&self, page: u32, total: u64) -> usize {
        let page_size = u64::from(self.source.page_size);
        let before = u64::from(page.saturating_sub(1)) * page_size;
        total.saturating_sub(before).min(page_size) as usize
    }

    /// One attempt at a page. `Ok(None)` means another page was rendered and nothing
    /// was written.
    async fn harvest_page(
        &self,
        page: u32,
        expected_rows: usize,
    ) -> Result<Option<PageCounts>, HarvestError> {
        let url = self.source.list_url(page);
        info!("Harvesting page {}", page);
        self.document.navigate(&url).await?;
        dismiss_consent(self.document).await;

        let outcome = self
            .settings
            .table_wait()
            .wait_until(|| async {
                let rows = self.document.count(site::list::ROWS).await?;
                Ok::<_, HarvestError>(rows >= expected_rows)
            })
            .await?;
        if !outcome.is_ready() {
            warn!("Table of page {} may not have {} rows", page, expected_rows);
        }

        let verifier =
            PageNumberVerifier::new(site::list::CURRENT_PAGE, self.settings.anchor_wait());
        if let PageCheck::Stale { rendered } = verifier.check(self.document, page).await? {
            warn!("Requested page {} but page {:?} is rendered", page, rendered);
            return Ok(None);
        }

        let rows = self
            .document
            .query_all(site::list::ROWS, &site::list::row_fields())
            .await?;
        debug!("Page {} rendered {} rows", page, rows.len());

        let mut counts = PageCounts::default();
        for row in &rows {
            let Some(fund) = fund_from_row(row) else {
                warn!("Skipping row without detail link: {:?}", row.get("name"));
                counts.skipped_rows += 1;
                continue;
            };
            match self.repository.upsert_base(&fund).await {
                Ok(UpsertOutcome::Inserted) => counts.inserted += 1,
                Ok(UpsertOutcome::Updated) => counts.updated += 1,
                Err(e) => {
                    error!("Failed to store fund {}: {}", fund.id, e);
                    counts.write_failures += 1;
                }
            }
        }
        Ok(Some(counts))
    }
}

/// Normalizes one listing row. `None` when no id can be derived from the row's link.
pub fn fund_from_row(row: &Record) -> Option<FundBase> {
    let id = row.get("url").and_then(site::fund_id_from_url)?;
    Some(FundBase {
        id,
        name: normalize::text_field(row.get("name")),
        fund_volume: normalize::text_field(row.get("fund_volume")),
        is_distributing: row.flag("is_distributing"),
        release_date: normalize::date_field("release_date", row.get("release_date")),
        replication_method: normalize::text_field(row.get("replication_method")),
        share_class_volume: normalize::text_field(row.get("share_class_volume")),
        total_expense_ratio: normalize::percent_field(
            "total_expense_ratio",
            row.get("total_expense_ratio"),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fixture::FixtureDocument;
    use crate::core::error::StoreError;
    use crate::core::fund::{FundDetail, FundRecord, FundStats};
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    const PAGE: &str = include_str!("../../tests/fixtures/list_page.html");
    const ROW: &str = include_str!("../../tests/fixtures/list_row.html");
    const DISTRIBUTING: &str = r#"<svg viewBox="0 0 24 24"><path d="M21.8371 9.6l-4.2 4.2"></path></svg>"#;
    const ACCUMULATING: &str = r#"<svg viewBox="0 0 24 24"><path d="M3.5 12h17"></path></svg>"#;

    fn source() -> SourceConfig {
        SourceConfig {
            list_url: "https://example.com/etf/suche?page={page}&per={per}".to_string(),
            detail_url: "https://example.com/etf/{id}/".to_string(),
            page_size: 2,
        }
    }

    fn settings() -> HarvestSettings {
        HarvestSettings {
            table_wait_ms: 5,
            anchor_wait_ms: 5,
            poll_interval_ms: 1,
            max_page_attempts: 3,
        }
    }

    fn row(id: &str, ter: &str, distributing: bool) -> String {
        ROW.replace("{id}", id)
            .replace("{name}", &format!("ETF {id}"))
            .replace("{ter}", ter)
            .replace("{icon}", if distributing { DISTRIBUTING } else { ACCUMULATING })
            .replace("{release_date}", "02.01.06")
    }

    fn page(current: u32, total: u64, rows: &[String]) -> String {
        PAGE.replace("{total}", &total.to_string())
            .replace("{page}", &current.to_string())
            .replace("{rows}", &rows.join("\n"))
    }

    #[test]
    fn test_fund_from_row_normalizes_fields() {
        let record = Record::from([
            ("url", Some("https://www.finanzfluss.de/informer/etf/ie00b4l5y983/")),
            ("name", Some("iShares Core MSCI World")),
            ("total_expense_ratio", Some("0,20\u{a0}%")),
            ("is_distributing", Some("true")),
            ("replication_method", Some("—")),
            ("fund_volume", Some("72.345 Mio. €")),
            ("share_class_volume", None),
            ("release_date", Some("25.09.09")),
        ]);

        let fund = fund_from_row(&record).unwrap();
        assert_eq!(fund.id, "ie00b4l5y983");
        assert_eq!(fund.name.as_deref(), Some("iShares Core MSCI World"));
        assert!((fund.total_expense_ratio.unwrap() - 0.002).abs() < 1e-6);
        assert!(fund.is_distributing);
        assert_eq!(fund.replication_method, None);
        assert_eq!(fund.share_class_volume, None);
        assert_eq!(fund.release_date, NaiveDate::from_ymd_opt(2009, 9, 25));
    }

    #[test]
    fn test_fund_from_row_without_link_is_skipped() {
        let record = Record::from([("url", None), ("name", Some("Orphan"))]);
        assert_eq!(fund_from_row(&record), None);
    }

    #[tokio::test]
    async fn test_harvest_single_page() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(
            &source.list_url(1),
            &page(1, 2, &[row("a", "0,20%", false), row("b", "0,07%", true)]),
        );
        let store = MemoryStore::new();

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_funds, 2);
        assert_eq!(report.pages_done, 1);
        assert_eq!(report.inserted, 2);
        assert!(report.failed_pages.is_empty());
        assert_eq!(store.list_ids_pending_detail().await.unwrap(), vec!["a", "b"]);

        let b = store.find("b").await.unwrap().unwrap();
        assert!(b.base.is_distributing);
        assert_eq!(b.base.release_date, NaiveDate::from_ymd_opt(2006, 1, 2));
        assert!(!store.find("a").await.unwrap().unwrap().base.is_distributing);
    }

    /// Wraps a memory store and refuses to write one fund.
    struct FailingStore {
        inner: MemoryStore,
        fail_id: &'static str,
    }

    #[async_trait::async_trait]
    impl FundRepository for FailingStore {
        async fn upsert_base(&self, fund: &FundBase) -> Result<UpsertOutcome, StoreError> {
            if fund.id == self.fail_id {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.upsert_base(fund).await
        }

        async fn update_detail(&self, detail: &FundDetail) -> Result<(), StoreError> {
            self.inner.update_detail(detail).await
        }

        async fn list_ids_pending_detail(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_ids_pending_detail().await
        }

        async fn list_all_ids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_all_ids().await
        }

        async fn find(&self, id: &str) -> Result<Option<FundRecord>, StoreError> {
            self.inner.find(id).await
        }

        async fn stats(&self) -> Result<FundStats, StoreError> {
            self.inner.stats().await
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_write_failure_is_counted_and_page_continues() {
        let source = SourceConfig {
            page_size: 3,
            ..source()
        };
        let settings = settings();
        let document = FixtureDocument::new().with_page(
            &source.list_url(1),
            &page(
                1,
                3,
                &[row("a", "0,1%", false), row("b", "0,1%", false), row("c", "0,1%", false)],
            ),
        );
        let store = FailingStore {
            inner: MemoryStore::new(),
            fail_id: "b",
        };

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .harvest(3)
            .await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.pages_done, 1);
        assert!(report.failed_pages.is_empty());
        assert_eq!(store.list_all_ids().await.unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_non_finite_ter_is_stored_as_missing() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(
            &source.list_url(1),
            &page(1, 1, &[row("a", "NaN %", false)]),
        );
        let store = MemoryStore::new();

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .harvest(1)
            .await;

        assert_eq!(report.inserted, 1);
        let a = store.find("a").await.unwrap().unwrap();
        assert_eq!(a.base.total_expense_ratio, None);
    }

    #[tokio::test]
    async fn test_stale_page_is_redone_without_writes() {
        let source = source();
        let settings = settings();
        // Page 3 first shows the DOM of page 2, then settles
        let document = FixtureDocument::new()
            .with_page(&source.list_url(1), &page(1, 5, &[row("a", "0,1%", false), row("b", "0,1%", false)]))
            .with_page(&source.list_url(2), &page(2, 5, &[row("c", "0,1%", false), row("d", "0,1%", false)]))
            .with_page(&source.list_url(3), &page(2, 5, &[row("stale", "0,1%", false)]))
            .with_page(&source.list_url(3), &page(3, 5, &[row("e", "0,1%", false)]));
        let store = MemoryStore::new();

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .harvest(5)
            .await;

        assert_eq!(report.pages_total, 3);
        assert_eq!(report.pages_done, 3);
        assert!(report.failed_pages.is_empty());
        assert_eq!(
            store.list_all_ids().await.unwrap(),
            vec!["a", "b", "c", "d", "e"]
        );
        let page_3_visits = document
            .visits()
            .iter()
            .filter(|url| **url == source.list_url(3))
            .count();
        assert_eq!(page_3_visits, 2);
    }

    #[tokio::test]
    async fn test_page_gives_up_after_max_attempts() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new()
            .with_page(&source.list_url(1), &page(1, 4, &[row("a", "0,1%", false), row("b", "0,1%", false)]))
            .with_page(&source.list_url(2), &page(1, 4, &[row("a", "0,1%", false), row("b", "0,1%", false)]));
        let store = MemoryStore::new();

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .harvest(4)
            .await;

        assert_eq!(report.pages_done, 1);
        assert_eq!(report.failed_pages, vec![2]);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(document.visits().len(), 1 + settings.max_page_attempts as usize);
    }

    #[tokio::test]
    async fn test_navigation_failure_fails_page_only() {
        let source = source();
        let settings = settings();
        // No fixture for page 1
        let document = FixtureDocument::new()
            .with_page(&source.list_url(2), &page(2, 3, &[row("c", "0,1%", false)]));
        let store = MemoryStore::new();

        let report = ListHarvester::new(&document, &store, &source, &settings)
            .harvest(3)
            .await;

        assert_eq!(report.failed_pages, vec![1]);
        assert_eq!(report.pages_done, 1);
        assert_eq!(store.list_all_ids().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_discover_total_reads_counter() {
        let source = SourceConfig {
            page_size: 100,
            ..source()
        };
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.list_url(1), &page(1, 1234, &[]));
        let store = MemoryStore::new();

        let harvester = ListHarvester::new(&document, &store, &source, &settings);
        assert_eq!(harvester.discover_total().await.unwrap(), 1234);
        assert_eq!(site::page_count(1234, source.page_size), 13);
        assert_eq!(document.clicks(), vec![site::CONSENT_DECLINE]);
    }

    #[tokio::test]
    async fn test_discover_total_without_counter_times_out() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.list_url(1), "<html></html>");
        let store = MemoryStore::new();

        let result = ListHarvester::new(&document, &store, &source, &settings)
            .run()
            .await;
        assert!(matches!(
            result,
            Err(HarvestError::VerificationTimeout { .. })
        ));
    }
}
