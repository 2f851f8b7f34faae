//! Error taxonomy shared by the harvesters and the persistence gateways

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Failed to navigate to {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{what} was not rendered within {waited:?}")]
    VerificationTimeout { what: String, waited: Duration },

    #[error("Failed to evaluate selector `{selector}`: {source}")]
    Extraction {
        selector: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cannot parse {field} from {value:?}: {reason}")]
    Normalization {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl HarvestError {
    pub fn navigation(url: &str, source: impl Into<anyhow::Error>) -> Self {
        HarvestError::Navigation {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub fn extraction(selector: &str, source: impl Into<anyhow::Error>) -> Self {
        HarvestError::Extraction {
            selector: selector.to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No base record exists for fund {0}")]
    UnknownFund(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to encode {field}: {source}")]
    Encode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {field} of fund {id}: {source}")]
    Decode {
        id: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
