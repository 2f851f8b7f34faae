use crate::core::error::StoreError;
use crate::core::fund::{FundBase, FundDetail, FundRecord, FundStats};
use crate::core::repository::{FundRepository, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory repository with the same contract as the SQLite one. Ids are kept in
/// sorted order so listings are deterministic.
#[derive(Default)]
pub struct MemoryStore {
    funds: Mutex<BTreeMap<String, FundRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FundRepository for MemoryStore {
    async fn upsert_base(&self, fund: &FundBase) -> Result<UpsertOutcome, StoreError> {
        let mut funds = self.funds.lock().await;
        let now = Utc::now();
        match funds.get_mut(&fund.id) {
            Some(record) => {
                debug!("Updating base record {}", fund.id);
                record.base = fund.clone();
                record.base_scraped_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                debug!("Inserting base record {}", fund.id);
                funds.insert(
                    fund.id.clone(),
                    FundRecord {
                        base: fund.clone(),
                        base_scraped_at: now,
                        detail: None,
                        detail_scraped_at: None,
                    },
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_detail(&self, detail: &FundDetail) -> Result<(), StoreError> {
        let mut funds = self.funds.lock().await;
        let record = funds
            .get_mut(&detail.id)
            .ok_or_else(|| StoreError::UnknownFund(detail.id.clone()))?;
        record.detail = Some(detail.clone());
        record.detail_scraped_at = Some(Utc::now());
        Ok(())
    }

    async fn list_ids_pending_detail(&self) -> Result<Vec<String>, StoreError> {
        let funds = self.funds.lock().await;
        Ok(funds
            .values()
            .filter(|record| record.is_pending_detail())
            .map(|record| record.base.id.clone())
            .collect())
    }

    async fn list_all_ids(&self) -> Result<Vec<String>, StoreError> {
        let funds = self.funds.lock().await;
        Ok(funds.keys().cloned().collect())
    }

    async fn find(&self, id: &str) -> Result<Option<FundRecord>, StoreError> {
        let funds = self.funds.lock().await;
        Ok(funds.get(id).cloned())
    }

    async fn stats(&self) -> Result<FundStats, StoreError> {
        let funds = self.funds.lock().await;
        Ok(FundStats {
            total: funds.len() as u64,
            pending_detail: funds.values().filter(|r| r.is_pending_detail()).count() as u64,
        })
    }
}
