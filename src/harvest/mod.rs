//! The crawl-and-extract pipeline: listing pages into base records, detail pages into
//! detail records.

pub mod detail;
pub mod list;
pub mod site;

pub use detail::{DetailHarvester, DetailReport, DetailTarget};
pub use list::{ListHarvester, ListReport};

use crate::core::document::PageDocument;
use tracing::{debug, warn};

/// Declines the cookie banner if it is showing. Never fails: a banner that is absent
/// or cannot be clicked only costs a log line.
pub(crate) async fn dismiss_consent(document: &dyn PageDocument) {
    match document.exists(site::CONSENT_DECLINE).await {
        Ok(true) => {
            if let Err(e) = document.click(site::CONSENT_DECLINE).await {
                warn!("Failed to dismiss consent banner: {e}");
            } else {
                debug!("Consent banner dismissed");
            }
        }
        Ok(false) => debug!("No consent banner"),
        Err(e) => warn!("Failed to look for consent banner: {e}"),
    }
}
