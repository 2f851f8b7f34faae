//! Per-fund detail pages into detail records.

use super::{dismiss_consent, site};
use crate::core::config::{HarvestSettings, SourceConfig};
use crate::core::document::{PageDocument, Record, Snapshot};
use crate::core::error::HarvestError;
use crate::core::fund::{
    ActivityShare, Allocation, FundDetail, Listing, PerformanceEntry, PeriodValue,
};
use crate::core::normalize;
use crate::core::repository::FundRepository;
use crate::core::verify::AnchorVerifier;
use anyhow::anyhow;
use indicatif::ProgressBar;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Which funds a detail run visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailTarget {
    Single(String),
    /// Every fund whose detail record has never been written.
    Pending,
    /// Every known fund, re-scraping existing detail records.
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailReport {
    pub requested: usize,
    pub updated: usize,
    /// Funds whose page never showed the ISIN; nothing was written for them.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailOutcome {
    Updated,
    Skipped,
}

pub struct DetailHarvester<'a> {
    document: &'a dyn PageDocument,
    repository: &'a dyn FundRepository,
    source: &'a SourceConfig,
    settings: &'a HarvestSettings,
    progress: Option<ProgressBar>,
}

impl<'a> DetailHarvester<'a> {
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
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Harvests every fund in `target` sequentially. Only building the work list can fail;
    /// a failing fund is logged and reported, and the run moves on.
    pub async fn run(&self, target: &DetailTarget) -> Result<DetailReport, HarvestError> {
        let ids = match target {
            DetailTarget::Single(id) => vec![id.clone()],
            DetailTarget::Pending => self.repository.list_ids_pending_detail().await?,
            DetailTarget::All => self.repository.list_all_ids().await?,
        };
        info!("Harvesting details of {} funds", ids.len());

        let mut report = DetailReport {
            requested: ids.len(),
            ..Default::default()
        };
        if let Some(pb) = &self.progress {
            pb.set_length(ids.len() as u64);
        }

        for id in ids {
            if let Some(pb) = &self.progress {
                pb.set_message(id.clone());
            }
            match self.harvest_one(&id).await {
                Ok(DetailOutcome::Updated) => report.updated += 1,
                Ok(DetailOutcome::Skipped) => report.skipped.push(id),
                Err(e) => {
                    error!("Failed to harvest details of {}: {}", id, e);
                    report.failed.push(id);
                }
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        info!(
            "Details done: {} updated, {} skipped, {} failed",
            report.updated,
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn harvest_one(&self, id: &str) -> Result<DetailOutcome, HarvestError> {
        let url = self.source.detail_url(id);
        debug!("Harvesting details of {} from {}", id, url);
        self.document.navigate(&url).await?;
        dismiss_consent(self.document).await;

        let anchor = AnchorVerifier::new(site::detail::ISIN, self.settings.anchor_wait());
        if !anchor.check(self.document).await? {
            warn!("No ISIN rendered for {}, skipping", id);
            return Ok(DetailOutcome::Skipped);
        }

        if self.document.exists(site::detail::SHOW_MORE).await? {
            if let Err(e) = self.document.click(site::detail::SHOW_MORE).await {
                warn!("Failed to expand details of {}: {}", id, e);
            }
        }

        let detail = self.extract(id).await?;
        let missing = detail.missing_fields();
        if !missing.is_empty() {
            warn!("Fund {} has no value for: {}", id, missing.join(", "));
        }

        self.repository.update_detail(&detail).await?;
        info!("Updated details of {} ({})", id, detail.isin);
        Ok(DetailOutcome::Updated)
    }

    /// Reads the rendered detail page of fund `id` in a single batched query.
    pub async fn extract(&self, id: &str) -> Result<FundDetail, HarvestError> {
        let snapshot = self
            .document
            .query_batch(&site::detail::page_queries())
            .await?;
        detail_from_snapshot(id, &snapshot)
    }
}

/// Builds the detail record from the rows of [`site::detail::page_queries`]. Fails only
/// when the ISIN is empty; every other field degrades to `None` or an empty list.
pub fn detail_from_snapshot(id: &str, snapshot: &Snapshot) -> Result<FundDetail, HarvestError> {
    use super::site::detail::labels;

    let isin = normalize::text_field(snapshot.first_text("isin")).ok_or_else(|| {
        HarvestError::extraction(site::detail::ISIN, anyhow!("ISIN is empty"))
    })?;
    let facts = Facts::new(snapshot.rows("facts"));

    Ok(FundDetail {
        id: id.to_string(),
        isin,
        wkn: normalize::text_field(snapshot.first_text("wkn")),
        nr_positions: normalize::count_field("nr_positions", facts.get(labels::NR_POSITIONS)),
        base_index: normalize::text_field(facts.get(labels::BASE_INDEX)),
        share_class_volume: normalize::text_field(facts.get(labels::SHARE_CLASS_VOLUME)),
        fund_domicile: normalize::text_field(facts.get(labels::FUND_DOMICILE)),
        fund_currency: normalize::text_field(facts.get(labels::FUND_CURRENCY)),
        securities_lending_permitted: normalize::flag_field(
            "securities_lending_permitted",
            facts.get(labels::SECURITIES_LENDING),
        ),
        trade_currency: normalize::text_field(facts.get(labels::TRADE_CURRENCY)),
        has_currency_hedging: normalize::flag_field(
            "has_currency_hedging",
            facts.get(labels::CURRENCY_HEDGING),
        ),
        has_special_assets: normalize::flag_field(
            "has_special_assets",
            facts.get(labels::SPECIAL_ASSETS),
        ),
        fund_provider: normalize::text_field(facts.get(labels::FUND_PROVIDER)),
        legal_structure: normalize::text_field(facts.get(labels::LEGAL_STRUCTURE)),
        fund_structure: normalize::text_field(facts.get(labels::FUND_STRUCTURE)),
        administrator: normalize::text_field(facts.get(labels::ADMINISTRATOR)),
        depotbank: normalize::text_field(facts.get(labels::DEPOTBANK)),
        auditor: normalize::text_field(facts.get(labels::AUDITOR)),
        weight_top_10: normalize::percent_field(
            "weight_top_10",
            snapshot.first_text("weight_top_10"),
        ),
        nr_stock_positions: count(snapshot, "nr_stock_positions"),
        nr_bond_positions: count(snapshot, "nr_bond_positions"),
        nr_cash_and_other_positions: count(snapshot, "nr_cash_and_other_positions"),
        country_composition: allocations(snapshot.rows("country_composition")),
        region_composition: allocations(snapshot.rows("region_composition")),
        currency_distribution: allocations(snapshot.rows("currency_distribution")),
        top_10_holdings: allocations(snapshot.rows("top_10_holdings")),
        industry_distribution: allocations(snapshot.rows("industry_distribution")),
        activity_distribution: activities(snapshot.rows("activity_distribution")),
        historical_performance: performances(snapshot.rows("historical_performance")),
        historical_volatility: periods(
            snapshot,
            "historical_volatility",
            normalize::percent_field,
        ),
        historical_max_drawdown: periods(
            snapshot,
            "historical_max_drawdown",
            normalize::percent_field,
        ),
        historical_sharpe_ratio: periods(
            snapshot,
            "historical_sharpe_ratio",
            normalize::decimal_field,
        ),
        exchanges: listings(snapshot.rows("exchanges")),
    })
}

fn count(snapshot: &Snapshot, field: &'static str) -> Option<i64> {
    normalize::count_field(field, snapshot.first_text(field))
}

fn periods(
    snapshot: &Snapshot,
    field: &'static str,
    parse: fn(&'static str, Option<&str>) -> Option<f32>,
) -> Vec<PeriodValue> {
    snapshot
        .rows(field)
        .iter()
        .filter_map(|row| {
            Some(PeriodValue {
                period: normalize::text_field(row.get("period"))?,
                value: parse(field, row.get("value")),
            })
        })
        .collect()
}

/// Key facts table keyed by normalized label.
struct Facts(HashMap<String, String>);

impl Facts {
    fn new(rows: &[Record]) -> Self {
        Self(
            rows.iter()
                .filter_map(|row| {
                    let label = row.get("label")?.trim().trim_end_matches(':').trim();
                    Some((label.to_lowercase(), row.get("value")?.to_string()))
                })
                .collect(),
        )
    }

    fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }
}

// Rows without a label carry no meaning and are dropped.

fn allocations(rows: &[Record]) -> Vec<Allocation> {
    rows.iter()
        .filter_map(|row| {
            Some(Allocation {
                label: normalize::text_field(row.get("label"))?,
                weight: normalize::percent_field("weight", row.get("weight")),
            })
        })
        .collect()
}

fn activities(rows: &[Record]) -> Vec<ActivityShare> {
    rows.iter()
        .filter_map(|row| {
            Some(ActivityShare {
                label: normalize::text_field(row.get("label"))?,
                min: normalize::percent_field("activity_min", row.get("min")),
                value: normalize::percent_field("activity_value", row.get("value")),
                max: normalize::percent_field("activity_max", row.get("max")),
            })
        })
        .collect()
}

fn performances(rows: &[Record]) -> Vec<PerformanceEntry> {
    rows.iter()
        .filter_map(|row| {
            Some(PerformanceEntry {
                timespan: normalize::text_field(row.get("timespan"))?,
                performance: normalize::percent_field("performance", row.get("performance")),
                annual_return: normalize::percent_field("annual_return", row.get("return")),
            })
        })
        .collect()
}

fn listings(rows: &[Record]) -> Vec<Listing> {
    rows.iter()
        .filter_map(|row| {
            Some(Listing {
                name: normalize::text_field(row.get("name"))?,
                currency: normalize::text_field(row.get("currency")),
                ticker: normalize::text_field(row.get("ticker")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{FieldQuery, RowQuery};
    use crate::core::error::StoreError;
    use crate::core::fund::FundBase;
    use crate::providers::fixture::FixtureDocument;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DETAIL_PAGE: &str = include_str!("../../tests/fixtures/detail_page.html");
    const LOADING_PAGE: &str = r#"<html><body><div class="etf-identifiers"></div><p>Lade...</p></body></html>"#;

    fn source() -> SourceConfig {
        SourceConfig {
            list_url: "https://example.com/etf/suche?page={page}&per={per}".to_string(),
            detail_url: "https://example.com/etf/{id}/".to_string(),
            page_size: 100,
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

    fn base(id: &str) -> FundBase {
        FundBase {
            id: id.to_string(),
            name: Some(format!("ETF {id}")),
            fund_volume: None,
            is_distributing: false,
            release_date: None,
            replication_method: None,
            share_class_volume: None,
            total_expense_ratio: Some(0.002),
        }
    }

    fn assert_close(actual: Option<f32>, expected: f32) {
        let actual = actual.unwrap();
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test]
    async fn test_extract_full_detail_page() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.detail_url("a"), DETAIL_PAGE);
        let store = MemoryStore::new();
        document.navigate(&source.detail_url("a")).await.unwrap();

        let detail = DetailHarvester::new(&document, &store, &source, &settings)
            .extract("a")
            .await
            .unwrap();

        assert_eq!(detail.isin, "IE00B4L5Y983");
        assert_eq!(detail.wkn.as_deref(), Some("A0RPWH"));
        assert_eq!(detail.nr_positions, Some(1432));
        assert_eq!(detail.base_index.as_deref(), Some("MSCI World"));
        assert_eq!(detail.share_class_volume.as_deref(), Some("72.345 Mio. €"));
        assert_eq!(detail.fund_currency.as_deref(), Some("USD"));
        assert_eq!(detail.securities_lending_permitted, Some(true));
        assert_eq!(detail.has_currency_hedging, Some(false));
        assert_eq!(detail.auditor.as_deref(), Some("Deloitte"));
        assert_close(detail.weight_top_10, 0.2156);
        assert_eq!(detail.nr_stock_positions, Some(1430));
        assert_eq!(detail.nr_bond_positions, Some(0));
        assert_eq!(detail.nr_cash_and_other_positions, Some(2));

        assert_eq!(detail.country_composition.len(), 3);
        assert_eq!(detail.country_composition[0].label, "USA");
        assert_close(detail.country_composition[0].weight, 0.7012);
        assert_eq!(detail.top_10_holdings[1].label, "Microsoft");
        // Dash placeholder counts as zero
        assert_eq!(detail.industry_distribution[2].weight, Some(0.0));
        assert_close(detail.activity_distribution[0].value, 0.996);
        assert_close(detail.historical_performance[1].annual_return, 0.0949);
        assert_close(detail.historical_max_drawdown[0].value, -0.0825);
        assert_close(detail.historical_sharpe_ratio[0].value, 1.85);
        assert_eq!(detail.historical_sharpe_ratio[1].value, Some(0.0));
        assert_eq!(detail.exchanges[1].ticker.as_deref(), Some("SWDA"));
        assert!(detail.missing_fields().is_empty());
    }

    #[tokio::test]
    async fn test_single_fund_is_updated() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.detail_url("a"), DETAIL_PAGE);
        let store = MemoryStore::new();
        store.upsert_base(&base("a")).await.unwrap();

        let report = DetailHarvester::new(&document, &store, &source, &settings)
            .run(&DetailTarget::Single("a".to_string()))
            .await
            .unwrap();

        assert_eq!(report.requested, 1);
        assert_eq!(report.updated, 1);
        assert!(store.list_ids_pending_detail().await.unwrap().is_empty());
        assert_eq!(
            document.clicks(),
            vec![site::CONSENT_DECLINE, site::detail::SHOW_MORE]
        );
    }

    #[tokio::test]
    async fn test_missing_anchor_skips_without_write() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.detail_url("a"), LOADING_PAGE);
        let store = MemoryStore::new();
        store.upsert_base(&base("a")).await.unwrap();

        let report = DetailHarvester::new(&document, &store, &source, &settings)
            .run(&DetailTarget::Pending)
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["a"]);
        assert_eq!(report.updated, 0);
        let record = store.find("a").await.unwrap().unwrap();
        assert!(record.detail.is_none());
        assert!(record.detail_scraped_at.is_none());
    }

    #[tokio::test]
    async fn test_pending_run_continues_past_failures() {
        let source = source();
        let settings = settings();
        // No fixture for b: navigation fails
        let document = FixtureDocument::new()
            .with_page(&source.detail_url("a"), DETAIL_PAGE)
            .with_page(&source.detail_url("c"), DETAIL_PAGE);
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.upsert_base(&base(id)).await.unwrap();
        }

        let report = DetailHarvester::new(&document, &store, &source, &settings)
            .run(&DetailTarget::Pending)
            .await
            .unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, vec!["b"]);
        assert_eq!(store.list_ids_pending_detail().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_all_target_rescrapes_harvested_funds() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.detail_url("a"), DETAIL_PAGE);
        let store = MemoryStore::new();
        store.upsert_base(&base("a")).await.unwrap();
        let harvester = DetailHarvester::new(&document, &store, &source, &settings);

        harvester.run(&DetailTarget::Pending).await.unwrap();
        let pending = harvester.run(&DetailTarget::Pending).await.unwrap();
        let all = harvester.run(&DetailTarget::All).await.unwrap();

        assert_eq!(pending.requested, 0);
        assert_eq!(all.requested, 1);
        assert_eq!(all.updated, 1);
    }

    #[tokio::test]
    async fn test_unknown_fund_is_reported_as_failure() {
        let source = source();
        let settings = settings();
        let document = FixtureDocument::new().with_page(&source.detail_url("ghost"), DETAIL_PAGE);
        let store = MemoryStore::new();
        let harvester = DetailHarvester::new(&document, &store, &source, &settings);

        let report = harvester
            .run(&DetailTarget::Single("ghost".to_string()))
            .await
            .unwrap();
        assert_eq!(report.failed, vec!["ghost"]);

        let direct = harvester.harvest_one("ghost").await;
        assert!(matches!(
            direct,
            Err(HarvestError::Persistence(StoreError::UnknownFund(_)))
        ));
    }

    /// Counts document calls made after navigation.
    #[derive(Default)]
    struct CountingDocument {
        inner: FixtureDocument,
        batches: AtomicUsize,
        single_queries: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PageDocument for CountingDocument {
        async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
            self.inner.navigate(url).await
        }

        async fn query_one(&self, selector: &str) -> Result<Option<String>, HarvestError> {
            self.single_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query_one(selector).await
        }

        async fn query_all(
            &self,
            row_selector: &str,
            fields: &[FieldQuery],
        ) -> Result<Vec<Record>, HarvestError> {
            self.single_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query_all(row_selector, fields).await
        }

        async fn query_batch(&self, queries: &[RowQuery]) -> Result<Snapshot, HarvestError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.query_batch(queries).await
        }

        async fn count(&self, selector: &str) -> Result<usize, HarvestError> {
            self.inner.count(selector).await
        }

        async fn click(&self, selector: &str) -> Result<(), HarvestError> {
            self.inner.click(selector).await
        }
    }

    #[tokio::test]
    async fn test_extract_reads_page_in_one_batch() {
        let source = source();
        let settings = settings();
        let document = CountingDocument {
            inner: FixtureDocument::new().with_page(&source.detail_url("a"), DETAIL_PAGE),
            ..Default::default()
        };
        let store = MemoryStore::new();
        document.navigate(&source.detail_url("a")).await.unwrap();

        let detail = DetailHarvester::new(&document, &store, &source, &settings)
            .extract("a")
            .await
            .unwrap();

        assert_eq!(detail.isin, "IE00B4L5Y983");
        assert_eq!(detail.exchanges.len(), 2);
        assert_eq!(document.batches.load(Ordering::SeqCst), 1);
        assert_eq!(document.single_queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_snapshot_without_isin_is_an_extraction_error() {
        let mut snapshot = Snapshot::default();
        snapshot.insert("isin", vec![Record::from([("text", Some("  "))])]);

        let result = detail_from_snapshot("a", &snapshot);
        assert!(matches!(result, Err(HarvestError::Extraction { .. })));
    }

    #[test]
    fn test_sparse_snapshot_degrades_to_empty_fields() {
        let mut snapshot = Snapshot::default();
        snapshot.insert("isin", vec![Record::from([("text", Some("IE00B4L5Y983"))])]);

        let detail = detail_from_snapshot("a", &snapshot).unwrap();
        assert_eq!(detail.isin, "IE00B4L5Y983");
        assert_eq!(detail.wkn, None);
        assert!(detail.country_composition.is_empty());
        assert_eq!(detail.missing_fields().len(), 31);
    }

    #[test]
    fn test_facts_labels_are_normalized() {
        let facts = Facts::new(&[
            Record::from([("label", Some("Fondswährung:")), ("value", Some("USD"))]),
            Record::from([("label", None), ("value", Some("orphan"))]),
        ]);
        assert_eq!(facts.get(site::detail::labels::FUND_CURRENCY), Some("USD"));
        assert_eq!(facts.0.len(), 1);
    }
}
