//! Core harvesting abstractions and pure logic

pub mod config;
pub mod document;
pub mod error;
pub mod fund;
pub mod log;
pub mod normalize;
pub mod repository;
pub mod verify;
pub mod wait;

// Re-export main types for cleaner imports
pub use document::{FieldKind, FieldQuery, PageDocument, Record};
pub use error::{HarvestError, StoreError};
pub use fund::{FundBase, FundDetail, FundRecord, FundStats};
pub use repository::{FundRepository, UpsertOutcome};
pub use wait::{WaitOutcome, WaitPolicy};
