use crate::core::error::StoreError;
use crate::core::fund::{FundBase, FundDetail, FundRecord, FundStats};
use crate::core::repository::{FundRepository, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const UPSERT_BASE: &str = r"
    INSERT INTO funds
        (id, name, fund_volume, is_distributing, release_date, replication_method,
         share_class_volume, total_expense_ratio, base_scraped_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        name = excluded.name,
        fund_volume = excluded.fund_volume,
        is_distributing = excluded.is_distributing,
        release_date = excluded.release_date,
        replication_method = excluded.replication_method,
        share_class_volume = excluded.share_class_volume,
        total_expense_ratio = excluded.total_expense_ratio,
        base_scraped_at = excluded.base_scraped_at
";

const UPSERT_DETAIL: &str = r"
    INSERT INTO fund_details
        (fund_id, isin, wkn, nr_positions, base_index, share_class_volume, fund_domicile,
         fund_currency, securities_lending_permitted, trade_currency, has_currency_hedging,
         has_special_assets, fund_provider, legal_structure, fund_structure, administrator,
         depotbank, auditor, weight_top_10, nr_stock_positions, nr_bond_positions,
         nr_cash_and_other_positions, country_composition, region_composition,
         currency_distribution, top_10_holdings, industry_distribution, activity_distribution,
         historical_performance, historical_volatility, historical_max_drawdown,
         historical_sharpe_ratio, exchanges, detail_scraped_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (fund_id) DO UPDATE SET
        isin = excluded.isin,
        wkn = excluded.wkn,
        nr_positions = excluded.nr_positions,
        base_index = excluded.base_index,
        share_class_volume = excluded.share_class_volume,
        fund_domicile = excluded.fund_domicile,
        fund_currency = excluded.fund_currency,
        securities_lending_permitted = excluded.securities_lending_permitted,
        trade_currency = excluded.trade_currency,
        has_currency_hedging = excluded.has_currency_hedging,
        has_special_assets = excluded.has_special_assets,
        fund_provider = excluded.fund_provider,
        legal_structure = excluded.legal_structure,
        fund_structure = excluded.fund_structure,
        administrator = excluded.administrator,
        depotbank = excluded.depotbank,
        auditor = excluded.auditor,
        weight_top_10 = excluded.weight_top_10,
        nr_stock_positions = excluded.nr_stock_positions,
        nr_bond_positions = excluded.nr_bond_positions,
        nr_cash_and_other_positions = excluded.nr_cash_and_other_positions,
        country_composition = excluded.country_composition,
        region_composition = excluded.region_composition,
        currency_distribution = excluded.currency_distribution,
        top_10_holdings = excluded.top_10_holdings,
        industry_distribution = excluded.industry_distribution,
        activity_distribution = excluded.activity_distribution,
        historical_performance = excluded.historical_performance,
        historical_volatility = excluded.historical_volatility,
        historical_max_drawdown = excluded.historical_max_drawdown,
        historical_sharpe_ratio = excluded.historical_sharpe_ratio,
        exchanges = excluded.exchanges,
        detail_scraped_at = excluded.detail_scraped_at
";

const SELECT_FUND: &str = r"
    SELECT f.id, f.name, f.fund_volume, f.is_distributing, f.release_date,
           f.replication_method, f.share_class_volume, f.total_expense_ratio, f.base_scraped_at,
           d.isin, d.wkn, d.nr_positions, d.base_index,
           d.share_class_volume AS detail_share_class_volume, d.fund_domicile, d.fund_currency,
           d.securities_lending_permitted, d.trade_currency, d.has_currency_hedging,
           d.has_special_assets, d.fund_provider, d.legal_structure, d.fund_structure,
           d.administrator, d.depotbank, d.auditor, d.weight_top_10, d.nr_stock_positions,
           d.nr_bond_positions, d.nr_cash_and_other_positions, d.country_composition,
           d.region_composition, d.currency_distribution, d.top_10_holdings,
           d.industry_distribution, d.activity_distribution, d.historical_performance,
           d.historical_volatility, d.historical_max_drawdown, d.historical_sharpe_ratio,
           d.exchanges, d.detail_scraped_at
    FROM funds f
    LEFT JOIN fund_details d ON d.fund_id = f.id
    WHERE f.id = ?
";

/// Relational fund repository. The pool is owned by the store and handed to it by the
/// caller; nothing here is process-global.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and applies pending migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!("Connected to database {}", url);
        Self::from_pool(pool).await
    }

    /// A private in-memory database. A single connection is kept alive because every
    /// SQLite in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn encode<T: Serialize>(field: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode { field, source })
}

fn decode<T: DeserializeOwned>(
    row: &SqliteRow,
    id: &str,
    field: &'static str,
) -> Result<Vec<T>, StoreError> {
    let Some(json) = row.try_get::<Option<String>, _>(field)? else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&json).map_err(|source| StoreError::Decode {
        id: id.to_string(),
        field,
        source,
    })
}

fn base_from_row(row: &SqliteRow) -> Result<FundBase, StoreError> {
    Ok(FundBase {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        fund_volume: row.try_get("fund_volume")?,
        is_distributing: row.try_get("is_distributing")?,
        release_date: row.try_get("release_date")?,
        replication_method: row.try_get("replication_method")?,
        share_class_volume: row.try_get("share_class_volume")?,
        total_expense_ratio: row.try_get("total_expense_ratio")?,
    })
}

fn detail_from_row(row: &SqliteRow, id: &str) -> Result<Option<FundDetail>, StoreError> {
    let Some(isin) = row.try_get::<Option<String>, _>("isin")? else {
        return Ok(None);
    };
    Ok(Some(FundDetail {
        id: id.to_string(),
        isin,
        wkn: row.try_get("wkn")?,
        nr_positions: row.try_get("nr_positions")?,
        base_index: row.try_get("base_index")?,
        share_class_volume: row.try_get("detail_share_class_volume")?,
        fund_domicile: row.try_get("fund_domicile")?,
        fund_currency: row.try_get("fund_currency")?,
        securities_lending_permitted: row.try_get("securities_lending_permitted")?,
        trade_currency: row.try_get("trade_currency")?,
        has_currency_hedging: row.try_get("has_currency_hedging")?,
        has_special_assets: row.try_get("has_special_assets")?,
        fund_provider: row.try_get("fund_provider")?,
        legal_structure: row.try_get("legal_structure")?,
        fund_structure: row.try_get("fund_structure")?,
        administrator: row.try_get("administrator")?,
        depotbank: row.try_get("depotbank")?,
        auditor: row.try_get("auditor")?,
        weight_top_10: row.try_get("weight_top_10")?,
        nr_stock_positions: row.try_get("nr_stock_positions")?,
        nr_bond_positions: row.try_get("nr_bond_positions")?,
        nr_cash_and_other_positions: row.try_get("nr_cash_and_other_positions")?,
        country_composition: decode(row, id, "country_composition")?,
        region_composition: decode(row, id, "region_composition")?,
        currency_distribution: decode(row, id, "currency_distribution")?,
        top_10_holdings: decode(row, id, "top_10_holdings")?,
        industry_distribution: decode(row, id, "industry_distribution")?,
        activity_distribution: decode(row, id, "activity_distribution")?,
        historical_performance: decode(row, id, "historical_performance")?,
        historical_volatility: decode(row, id, "historical_volatility")?,
        historical_max_drawdown: decode(row, id, "historical_max_drawdown")?,
        historical_sharpe_ratio: decode(row, id, "historical_sharpe_ratio")?,
        exchanges: decode(row, id, "exchanges")?,
    }))
}

#[async_trait]
impl FundRepository for SqliteStore {
    async fn upsert_base(&self, fund: &FundBase) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let existed: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM funds WHERE id = ?)")
            .bind(&fund.id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(UPSERT_BASE)
            .bind(&fund.id)
            .bind(&fund.name)
            .bind(&fund.fund_volume)
            .bind(fund.is_distributing)
            .bind(fund.release_date)
            .bind(&fund.replication_method)
            .bind(&fund.share_class_volume)
            .bind(fund.total_expense_ratio)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Upserted base record {}", fund.id);
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn update_detail(&self, detail: &FundDetail) -> Result<(), StoreError> {
        // Encode everything first so a bad collection cannot leave a half-written row
        let collections = [
            encode("country_composition", &detail.country_composition)?,
            encode("region_composition", &detail.region_composition)?,
            encode("currency_distribution", &detail.currency_distribution)?,
            encode("top_10_holdings", &detail.top_10_holdings)?,
            encode("industry_distribution", &detail.industry_distribution)?,
            encode("activity_distribution", &detail.activity_distribution)?,
            encode("historical_performance", &detail.historical_performance)?,
            encode("historical_volatility", &detail.historical_volatility)?,
            encode("historical_max_drawdown", &detail.historical_max_drawdown)?,
            encode("historical_sharpe_ratio", &detail.historical_sharpe_ratio)?,
            encode("exchanges", &detail.exchanges)?,
        ];

        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM funds WHERE id = ?)")
            .bind(&detail.id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StoreError::UnknownFund(detail.id.clone()));
        }

        let mut query = sqlx::query(UPSERT_DETAIL)
            .bind(&detail.id)
            .bind(&detail.isin)
            .bind(&detail.wkn)
            .bind(detail.nr_positions)
            .bind(&detail.base_index)
            .bind(&detail.share_class_volume)
            .bind(&detail.fund_domicile)
            .bind(&detail.fund_currency)
            .bind(detail.securities_lending_permitted)
            .bind(&detail.trade_currency)
            .bind(detail.has_currency_hedging)
            .bind(detail.has_special_assets)
            .bind(&detail.fund_provider)
            .bind(&detail.legal_structure)
            .bind(&detail.fund_structure)
            .bind(&detail.administrator)
            .bind(&detail.depotbank)
            .bind(&detail.auditor)
            .bind(detail.weight_top_10)
            .bind(detail.nr_stock_positions)
            .bind(detail.nr_bond_positions)
            .bind(detail.nr_cash_and_other_positions);
        for json in collections {
            query = query.bind(json);
        }
        query.bind(Utc::now()).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!("Updated detail record {}", detail.id);
        Ok(())
    }

    async fn list_ids_pending_detail(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar(
            r"
            SELECT f.id FROM funds f
            LEFT JOIN fund_details d ON d.fund_id = f.id
            WHERE d.detail_scraped_at IS NULL
            ORDER BY f.id
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn list_all_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar("SELECT id FROM funds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn find(&self, id: &str) -> Result<Option<FundRecord>, StoreError> {
        let Some(row) = sqlx::query(SELECT_FUND)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let base_scraped_at: DateTime<Utc> = row.try_get("base_scraped_at")?;
        let detail_scraped_at: Option<DateTime<Utc>> = row.try_get("detail_scraped_at")?;
        Ok(Some(FundRecord {
            base: base_from_row(&row)?,
            base_scraped_at,
            detail: detail_from_row(&row, id)?,
            detail_scraped_at,
        }))
    }

    async fn stats(&self) -> Result<FundStats, StoreError> {
        let (total, pending_detail): (i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN d.detail_scraped_at IS NULL THEN 1 ELSE 0 END), 0)
            FROM funds f
            LEFT JOIN fund_details d ON d.fund_id = f.id
            ",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(FundStats {
            total: total.max(0) as u64,
            pending_detail: pending_detail.max(0) as u64,
        })
    }
}
