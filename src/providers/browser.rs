//! A [`PageDocument`] backed by a single Chrome tab driven over CDP.

use crate::core::config::BrowserSettings;
use crate::core::document::{FieldQuery, PageDocument, Record, RowQuery, Snapshot};
use crate::core::error::HarvestError;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reads the requested fields from every row; mirrors `FixtureDocument::query_all`.
const QUERY_ALL_SCRIPT: &str = r#"
(rowSelector, fields) => Array.from(document.querySelectorAll(rowSelector)).map(row => {
    const out = {};
    for (const field of fields) {
        const node = field.selector ? row.querySelector(field.selector) : row;
        switch (field.kind.kind) {
            case "exists": out[field.name] = node ? "true" : "false"; break;
            case "attr": out[field.name] = node ? node.getAttribute(field.kind.name) : null; break;
            default: out[field.name] = node ? node.innerText.trim() : null;
        }
    }
    return out;
})
"#;

/// Runs several row queries in one evaluation so they all see the same DOM.
const QUERY_BATCH_SCRIPT: &str = r#"
(readRows, queries) => Object.fromEntries(
    queries.map(query => [query.name, readRows(query.row_selector, query.fields)])
)
"#;

/// One browser process with one tab, used sequentially for a whole harvest run.
///
/// [`BrowserSession::close`] tears down both the tab and the process; dropping the
/// session without closing it leaves cleanup to chromiumoxide.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if let Some(user_data_dir) = &settings.user_data_dir {
            builder = builder.user_data_dir(user_data_dir);
        }
        if let Some(profile) = &settings.profile_directory {
            builder = builder.arg(format!("--profile-directory={profile}"));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event loop ended: {e}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;
        info!("Browser session started");

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.page.clone().close().await {
            warn!("Failed to close browser tab: {e}");
        }
        self.browser
            .close()
            .await
            .context("Failed to close browser")?;
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {e}");
        }
        self.handler.abort();
        info!("Browser session closed");
        Ok(())
    }

    async fn evaluate<T: DeserializeOwned>(
        &self,
        selector: &str,
        script: String,
    ) -> Result<T, HarvestError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| HarvestError::extraction(selector, e))?
            .into_value::<T>()
            .map_err(|e| HarvestError::extraction(selector, e))
    }
}

fn js_string(value: &str) -> Result<String, HarvestError> {
    serde_json::to_string(value).map_err(|e| HarvestError::extraction(value, e))
}

#[async_trait]
impl PageDocument for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| HarvestError::navigation(url, e))?;
        Ok(())
    }

    async fn query_one(&self, selector: &str) -> Result<Option<String>, HarvestError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerText.trim() : null; }})()",
            js_string(selector)?
        );
        self.evaluate(selector, script).await
    }

    async fn query_all(
        &self,
        row_selector: &str,
        fields: &[FieldQuery],
    ) -> Result<Vec<Record>, HarvestError> {
        let fields_json =
            serde_json::to_string(fields).map_err(|e| HarvestError::extraction(row_selector, e))?;
        let script = format!(
            "({})({}, {})",
            QUERY_ALL_SCRIPT.trim(),
            js_string(row_selector)?,
            fields_json
        );
        let rows: Vec<HashMap<String, Option<String>>> =
            self.evaluate(row_selector, script).await?;
        Ok(rows.into_iter().map(Record::new).collect())
    }

    async fn query_batch(&self, queries: &[RowQuery]) -> Result<Snapshot, HarvestError> {
        let queries_json =
            serde_json::to_string(queries).map_err(|e| HarvestError::extraction("batch", e))?;
        let script = format!(
            "({})({}, {})",
            QUERY_BATCH_SCRIPT.trim(),
            QUERY_ALL_SCRIPT.trim(),
            queries_json
        );
        let batch: HashMap<String, Vec<HashMap<String, Option<String>>>> =
            self.evaluate("batch", script).await?;
        Ok(Snapshot::new(
            batch
                .into_iter()
                .map(|(name, rows)| (name, rows.into_iter().map(Record::new).collect()))
                .collect(),
        ))
    }

    async fn count(&self, selector: &str) -> Result<usize, HarvestError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)?
        );
        self.evaluate(selector, script).await
    }

    async fn click(&self, selector: &str) -> Result<(), HarvestError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| HarvestError::extraction(selector, e))?
            .click()
            .await
            .map_err(|e| HarvestError::extraction(selector, e))?;
        Ok(())
    }
}
