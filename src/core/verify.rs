//! Checks that a navigation produced the expected rendered state before its data is used.
//!
//! The source is a client-rendered app that can keep showing the previous page's DOM, or
//! a half-built one, after a navigation has "completed".

use crate::core::document::PageDocument;
use crate::core::error::HarvestError;
use crate::core::wait::WaitPolicy;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCheck {
    /// The pagination indicator shows the requested page.
    Current,
    /// Another page (or an unreadable indicator) is rendered.
    Stale { rendered: Option<u32> },
}

/// Compares the rendered pagination indicator with the requested page number.
#[derive(Debug, Clone)]
pub struct PageNumberVerifier {
    indicator: String,
    policy: WaitPolicy,
}

impl PageNumberVerifier {
    pub fn new(indicator: &str, policy: WaitPolicy) -> Self {
        Self {
            indicator: indicator.to_string(),
            policy,
        }
    }

    /// Fails with [`HarvestError::VerificationTimeout`] when no indicator renders
    /// within the policy's budget.
    pub async fn check(
        &self,
        document: &dyn PageDocument,
        expected: u32,
    ) -> Result<PageCheck, HarvestError> {
        let outcome = self
            .policy
            .wait_until(|| document.exists(&self.indicator))
            .await?;
        if !outcome.is_ready() {
            return Err(HarvestError::VerificationTimeout {
                what: format!("Pagination indicator `{}`", self.indicator),
                waited: self.policy.max_wait,
            });
        }

        let text = document.query_one(&self.indicator).await?;
        let rendered = text.as_deref().and_then(|t| t.trim().parse::<u32>().ok());
        if rendered.is_none() {
            warn!("Unreadable pagination indicator: {:?}", text);
        }
        debug!("Rendered page {:?}, expected {}", rendered, expected);

        Ok(match rendered {
            Some(page) if page == expected => PageCheck::Current,
            rendered => PageCheck::Stale { rendered },
        })
    }
}

/// Gates a detail page on the presence of its identifying element.
#[derive(Debug, Clone)]
pub struct AnchorVerifier {
    anchor: String,
    policy: WaitPolicy,
}

impl AnchorVerifier {
    pub fn new(anchor: &str, policy: WaitPolicy) -> Self {
        Self {
            anchor: anchor.to_string(),
            policy,
        }
    }

    /// `true` once the anchor has rendered; `false` when the budget ran out without it.
    pub async fn check(&self, document: &dyn PageDocument) -> Result<bool, HarvestError> {
        let outcome = self
            .policy
            .wait_until(|| document.exists(&self.anchor))
            .await?;
        Ok(outcome.is_ready())
    }
}
