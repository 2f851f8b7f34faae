//! Fund records as they are harvested and stored

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Summary attributes harvested from one row of the listing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundBase {
    /// Last path segment of the fund's detail-page URL.
    pub id: String,
    pub name: Option<String>,
    pub fund_volume: Option<String>,
    pub is_distributing: bool,
    pub release_date: Option<NaiveDate>,
    pub replication_method: Option<String>,
    pub share_class_volume: Option<String>,
    /// Fraction, e.g. `0.0022` for `0,22 %`.
    pub total_expense_ratio: Option<f32>,
}

/// A labelled share of the fund, e.g. a country or a holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub label: String,
    pub weight: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityShare {
    pub label: String,
    pub min: Option<f32>,
    pub value: Option<f32>,
    pub max: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub timespan: String,
    pub performance: Option<f32>,
    pub annual_return: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodValue {
    pub period: String,
    pub value: Option<f32>,
}

/// An exchange the fund is tradable on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub name: String,
    pub currency: Option<String>,
    pub ticker: Option<String>,
}

/// Attributes harvested from a fund's detail page.
///
/// `isin` is the anchor field: a detail record is only built once the ISIN has rendered,
/// so it is never optional. Sub-collections are replaced as a whole on every update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FundDetail {
    pub id: String,
    pub isin: String,
    pub wkn: Option<String>,
    pub nr_positions: Option<i64>,
    pub base_index: Option<String>,
    pub share_class_volume: Option<String>,
    pub fund_domicile: Option<String>,
    pub fund_currency: Option<String>,
    pub securities_lending_permitted: Option<bool>,
    pub trade_currency: Option<String>,
    pub has_currency_hedging: Option<bool>,
    pub has_special_assets: Option<bool>,
    pub fund_provider: Option<String>,
    pub legal_structure: Option<String>,
    pub fund_structure: Option<String>,
    pub administrator: Option<String>,
    pub depotbank: Option<String>,
    pub auditor: Option<String>,
    pub weight_top_10: Option<f32>,
    pub nr_stock_positions: Option<i64>,
    pub nr_bond_positions: Option<i64>,
    pub nr_cash_and_other_positions: Option<i64>,
    pub country_composition: Vec<Allocation>,
    pub region_composition: Vec<Allocation>,
    pub currency_distribution: Vec<Allocation>,
    pub top_10_holdings: Vec<Allocation>,
    pub industry_distribution: Vec<Allocation>,
    pub activity_distribution: Vec<ActivityShare>,
    pub historical_performance: Vec<PerformanceEntry>,
    pub historical_volatility: Vec<PeriodValue>,
    pub historical_max_drawdown: Vec<PeriodValue>,
    pub historical_sharpe_ratio: Vec<PeriodValue>,
    pub exchanges: Vec<Listing>,
}

impl FundDetail {
    /// Names of the optional fields that are empty. Used for best-effort validation
    /// warnings before the record is written; an incomplete record is still stored.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let scalars: [(&'static str, bool); 21] = [
            ("wkn", self.wkn.is_none()),
            ("nr_positions", self.nr_positions.is_none()),
            ("base_index", self.base_index.is_none()),
            ("share_class_volume", self.share_class_volume.is_none()),
            ("fund_domicile", self.fund_domicile.is_none()),
            ("fund_currency", self.fund_currency.is_none()),
            (
                "securities_lending_permitted",
                self.securities_lending_permitted.is_none(),
            ),
            ("trade_currency", self.trade_currency.is_none()),
            ("has_currency_hedging", self.has_currency_hedging.is_none()),
            ("has_special_assets", self.has_special_assets.is_none()),
            ("fund_provider", self.fund_provider.is_none()),
            ("legal_structure", self.legal_structure.is_none()),
            ("fund_structure", self.fund_structure.is_none()),
            ("administrator", self.administrator.is_none()),
            ("depotbank", self.depotbank.is_none()),
            ("auditor", self.auditor.is_none()),
            ("weight_top_10", self.weight_top_10.is_none()),
            ("nr_stock_positions", self.nr_stock_positions.is_none()),
            ("nr_bond_positions", self.nr_bond_positions.is_none()),
            (
                "nr_cash_and_other_positions",
                self.nr_cash_and_other_positions.is_none(),
            ),
            ("isin", self.isin.is_empty()),
        ];
        let collections: [(&'static str, bool); 11] = [
            ("country_composition", self.country_composition.is_empty()),
            ("region_composition", self.region_composition.is_empty()),
            ("currency_distribution", self.currency_distribution.is_empty()),
            ("top_10_holdings", self.top_10_holdings.is_empty()),
            ("industry_distribution", self.industry_distribution.is_empty()),
            ("activity_distribution", self.activity_distribution.is_empty()),
            ("historical_performance", self.historical_performance.is_empty()),
            ("historical_volatility", self.historical_volatility.is_empty()),
            ("historical_max_drawdown", self.historical_max_drawdown.is_empty()),
            ("historical_sharpe_ratio", self.historical_sharpe_ratio.is_empty()),
            ("exchanges", self.exchanges.is_empty()),
        ];

        scalars
            .into_iter()
            .chain(collections)
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect()
    }
}

/// A stored fund: base attributes plus the detail record once one has been written.
#[derive(Debug, Clone, PartialEq)]
pub struct FundRecord {
    pub base: FundBase,
    pub base_scraped_at: DateTime<Utc>,
    pub detail: Option<FundDetail>,
    pub detail_scraped_at: Option<DateTime<Utc>>,
}

impl FundRecord {
    pub fn is_pending_detail(&self) -> bool {
        self.detail_scraped_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FundStats {
    pub total: u64,
    pub pending_detail: u64,
}

impl FundStats {
    pub fn with_detail(&self) -> u64 {
        self.total.saturating_sub(self.pending_detail)
    }
}
