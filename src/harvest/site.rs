//! Markup of the source site: every selector the harvesters rely on lives here.

use crate::core::document::{FieldQuery, RowQuery};

/// Cookie banner decline button; absent once consent has been given.
pub const CONSENT_DECLINE: &str = "#CybotCookiebotDialogBodyButtonDecline";

pub mod list {
    use super::FieldQuery;

    /// Total number of funds matching the search, e.g. `4.123`.
    pub const RESULT_COUNT: &str = ".result-number";
    pub const CURRENT_PAGE: &str = "button.pagination-number.current-number";
    pub const ROWS: &str = ".results-table .table-container table tbody tr";
    /// The arrow icon the listing shows for distributing funds.
    pub const DISTRIBUTING_ICON: &str = r#"svg path[d^="M21.8371"]"#;

    pub fn row_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::attr("url", ".name a", "href"),
            FieldQuery::text("name", ".name"),
            FieldQuery::text("total_expense_ratio", ".totalExpenseRatio"),
            FieldQuery::exists("is_distributing", DISTRIBUTING_ICON),
            FieldQuery::text("replication_method", ".replicationMethod"),
            FieldQuery::text("fund_volume", ".fundVolume"),
            FieldQuery::text("share_class_volume", ".shareClassVolume"),
            FieldQuery::text("release_date", ".releaseDate"),
        ]
    }
}

pub mod detail {
    use super::{FieldQuery, RowQuery};

    /// Anchor: the page is only trusted once the ISIN has rendered.
    pub const ISIN: &str = ".etf-identifiers .isin";
    pub const WKN: &str = ".etf-identifiers .wkn";
    pub const SHOW_MORE: &str = "button.show-more-details";

    /// Label/value rows of the key facts table.
    pub const FACTS: &str = ".etf-facts tr";
    pub const WEIGHT_TOP_10: &str = ".top-holdings .weight-top-10";
    pub const NR_STOCK_POSITIONS: &str = ".position-types .stocks";
    pub const NR_BOND_POSITIONS: &str = ".position-types .bonds";
    pub const NR_CASH_AND_OTHER_POSITIONS: &str = ".position-types .cash-and-other";

    pub const COUNTRY_COMPOSITION: &str = ".country-composition li";
    pub const REGION_COMPOSITION: &str = ".region-composition li";
    pub const CURRENCY_DISTRIBUTION: &str = ".currency-distribution li";
    pub const TOP_10_HOLDINGS: &str = ".top-holdings li";
    pub const INDUSTRY_DISTRIBUTION: &str = ".industry-distribution li";
    pub const ACTIVITY_DISTRIBUTION: &str = ".activity-distribution li";
    pub const HISTORICAL_PERFORMANCE: &str = ".historical-performance tbody tr";
    pub const HISTORICAL_VOLATILITY: &str = ".historical-volatility tbody tr";
    pub const HISTORICAL_MAX_DRAWDOWN: &str = ".historical-max-drawdown tbody tr";
    pub const HISTORICAL_SHARPE_RATIO: &str = ".historical-sharpe-ratio tbody tr";
    pub const EXCHANGES: &str = ".exchanges tbody tr";

    /// Row labels of the key facts table, compared case-insensitively without a
    /// trailing colon.
    pub mod labels {
        pub const NR_POSITIONS: &str = "anzahl positionen";
        pub const BASE_INDEX: &str = "basisindex";
        pub const SHARE_CLASS_VOLUME: &str = "fondsvolumen anteilsklasse";
        pub const FUND_DOMICILE: &str = "fondsdomizil";
        pub const FUND_CURRENCY: &str = "fondswährung";
        pub const SECURITIES_LENDING: &str = "wertpapierleihe";
        pub const TRADE_CURRENCY: &str = "handelswährung";
        pub const CURRENCY_HEDGING: &str = "währungssicherung";
        pub const SPECIAL_ASSETS: &str = "sondervermögen";
        pub const FUND_PROVIDER: &str = "fondsanbieter";
        pub const LEGAL_STRUCTURE: &str = "rechtsform";
        pub const FUND_STRUCTURE: &str = "fondsstruktur";
        pub const ADMINISTRATOR: &str = "administrator";
        pub const DEPOTBANK: &str = "depotbank";
        pub const AUDITOR: &str = "wirtschaftsprüfer";
    }

    /// Everything read from a rendered detail page, as one batch. Queries are named after
    /// the record field they fill.
    pub fn page_queries() -> Vec<RowQuery> {
        vec![
            RowQuery::text("isin", ISIN),
            RowQuery::text("wkn", WKN),
            RowQuery::new("facts", FACTS, fact_fields()),
            RowQuery::text("weight_top_10", WEIGHT_TOP_10),
            RowQuery::text("nr_stock_positions", NR_STOCK_POSITIONS),
            RowQuery::text("nr_bond_positions", NR_BOND_POSITIONS),
            RowQuery::text("nr_cash_and_other_positions", NR_CASH_AND_OTHER_POSITIONS),
            RowQuery::new("country_composition", COUNTRY_COMPOSITION, allocation_fields()),
            RowQuery::new("region_composition", REGION_COMPOSITION, allocation_fields()),
            RowQuery::new("currency_distribution", CURRENCY_DISTRIBUTION, allocation_fields()),
            RowQuery::new("top_10_holdings", TOP_10_HOLDINGS, allocation_fields()),
            RowQuery::new("industry_distribution", INDUSTRY_DISTRIBUTION, allocation_fields()),
            RowQuery::new("activity_distribution", ACTIVITY_DISTRIBUTION, activity_fields()),
            RowQuery::new(
                "historical_performance",
                HISTORICAL_PERFORMANCE,
                performance_fields(),
            ),
            RowQuery::new("historical_volatility", HISTORICAL_VOLATILITY, period_fields()),
            RowQuery::new("historical_max_drawdown", HISTORICAL_MAX_DRAWDOWN, period_fields()),
            RowQuery::new("historical_sharpe_ratio", HISTORICAL_SHARPE_RATIO, period_fields()),
            RowQuery::new("exchanges", EXCHANGES, exchange_fields()),
        ]
    }

    pub fn fact_fields() -> Vec<FieldQuery> {
        vec![FieldQuery::text("label", "th"), FieldQuery::text("value", "td")]
    }

    pub fn allocation_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::text("label", ".label"),
            FieldQuery::text("weight", ".percentile"),
        ]
    }

    pub fn activity_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::text("label", ".label"),
            FieldQuery::text("min", ".min"),
            FieldQuery::text("value", ".value"),
            FieldQuery::text("max", ".max"),
        ]
    }

    pub fn performance_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::text("timespan", ".timespan"),
            FieldQuery::text("performance", ".performance"),
            FieldQuery::text("return", ".return"),
        ]
    }

    pub fn period_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::text("period", ".period"),
            FieldQuery::text("value", ".value"),
        ]
    }

    pub fn exchange_fields() -> Vec<FieldQuery> {
        vec![
            FieldQuery::text("name", ".name"),
            FieldQuery::text("currency", ".currency"),
            FieldQuery::text("ticker", ".ticker"),
        ]
    }
}

/// Derives a fund id from its detail-page link: trailing slash stripped, last path
/// segment taken. Query strings and fragments are ignored.
pub fn fund_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

/// Number of listing pages needed for `total` results.
pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size)) as u32
}
