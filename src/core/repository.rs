//! Persistence abstraction for harvested funds

use crate::core::error::StoreError;
use crate::core::fund::{FundBase, FundDetail, FundRecord, FundStats};
use async_trait::async_trait;

/// What an upsert did to the stored base record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Two-phase storage of funds: the base record from the listing, then the detail record.
///
/// A fund whose detail has never been written is "pending detail"; that state is the
/// work queue the detail harvester drains.
#[async_trait]
pub trait FundRepository: Send + Sync {
    /// Inserts the fund or overwrites all of its base attributes, refreshing the base
    /// scrape timestamp. The detail record is left untouched.
    async fn upsert_base(&self, fund: &FundBase) -> Result<UpsertOutcome, StoreError>;

    /// Overwrites the detail record of an existing fund and refreshes the detail scrape
    /// timestamp. Fails with [`StoreError::UnknownFund`] when no base record exists.
    async fn update_detail(&self, detail: &FundDetail) -> Result<(), StoreError>;

    async fn list_ids_pending_detail(&self) -> Result<Vec<String>, StoreError>;

    async fn list_all_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn find(&self, id: &str) -> Result<Option<FundRecord>, StoreError>;

    async fn stats(&self) -> Result<FundStats, StoreError>;
}
