//! A [`PageDocument`] over static HTML, keyed by URL.
//!
//! Each URL holds a queue of renders: every navigation consumes the front render until only
//! one is left, which is then served for all further visits. This models a client-rendered
//! page that first shows a stale DOM and settles on a later visit.

use crate::core::document::{FieldKind, FieldQuery, PageDocument, Record, RowQuery, Snapshot};
use crate::core::error::HarvestError;
use anyhow::anyhow;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct FixtureDocument {
    pages: Mutex<HashMap<String, VecDeque<String>>>,
    current: Mutex<Option<String>>,
    visits: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
}

impl FixtureDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `html` as the next render of `url`.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.add_page(url, html);
        self
    }

    pub fn add_page(&self, url: &str, html: &str) {
        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        pages
            .entry(url.to_string())
            .or_default()
            .push_back(html.to_string());
    }

    /// URLs navigated to, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Selectors clicked, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.clicks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn with_html<T>(&self, f: impl FnOnce(&Html) -> T) -> Result<T, HarvestError> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let source = current
            .as_deref()
            .ok_or_else(|| HarvestError::extraction("document", anyhow!("No page loaded")))?;
        let html = Html::parse_document(source);
        Ok(f(&html))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, HarvestError> {
    Selector::parse(selector)
        .map_err(|e| HarvestError::extraction(selector, anyhow!("Invalid selector: {e}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn read_field(
    row: ElementRef<'_>,
    field: &FieldQuery,
    selector: Option<&Selector>,
) -> Option<String> {
    let node = match selector {
        Some(selector) => row.select(selector).next(),
        None => Some(row),
    };
    match &field.kind {
        FieldKind::Text => node.map(element_text),
        FieldKind::Attr(name) => node
            .and_then(|n| n.value().attr(name))
            .map(str::to_string),
        FieldKind::Exists => Some(node.is_some().to_string()),
    }
}

/// Parsed selectors of one row query.
struct CompiledQuery<'q> {
    rows: Selector,
    fields: &'q [FieldQuery],
    field_selectors: Vec<Option<Selector>>,
}

impl<'q> CompiledQuery<'q> {
    fn new(row_selector: &str, fields: &'q [FieldQuery]) -> Result<Self, HarvestError> {
        let field_selectors = fields
            .iter()
            .map(|field| {
                if field.selector.is_empty() {
                    Ok(None)
                } else {
                    parse_selector(field.selector).map(Some)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rows: parse_selector(row_selector)?,
            fields,
            field_selectors,
        })
    }

    fn read(&self, html: &Html) -> Vec<Record> {
        html.select(&self.rows)
            .map(|row| {
                let values = self
                    .fields
                    .iter()
                    .zip(&self.field_selectors)
                    .map(|(field, selector)| {
                        (
                            field.name.to_string(),
                            read_field(row, field, selector.as_ref()),
                        )
                    })
                    .collect();
                Record::new(values)
            })
            .collect()
    }
}

#[async_trait]
impl PageDocument for FixtureDocument {
    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        self.visits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        let renders = pages
            .get_mut(url)
            .filter(|renders| !renders.is_empty())
            .ok_or_else(|| HarvestError::navigation(url, anyhow!("No fixture for URL")))?;
        let html = if renders.len() > 1 {
            renders.pop_front()
        } else {
            renders.front().cloned()
        };

        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = html;
        Ok(())
    }

    async fn query_one(&self, selector: &str) -> Result<Option<String>, HarvestError> {
        let selector = parse_selector(selector)?;
        self.with_html(|html| html.select(&selector).next().map(element_text))
    }

    async fn query_all(
        &self,
        row_selector: &str,
        fields: &[FieldQuery],
    ) -> Result<Vec<Record>, HarvestError> {
        let query = CompiledQuery::new(row_selector, fields)?;
        self.with_html(|html| query.read(html))
    }

    async fn query_batch(&self, queries: &[RowQuery]) -> Result<Snapshot, HarvestError> {
        let compiled = queries
            .iter()
            .map(|query| CompiledQuery::new(query.row_selector, &query.fields))
            .collect::<Result<Vec<_>, _>>()?;

        // One parse serves every query
        self.with_html(|html| {
            let mut snapshot = Snapshot::default();
            for (query, compiled) in queries.iter().zip(&compiled) {
                snapshot.insert(query.name, compiled.read(html));
            }
            snapshot
        })
    }

    async fn count(&self, selector: &str) -> Result<usize, HarvestError> {
        let selector_parsed = parse_selector(selector)?;
        self.with_html(|html| html.select(&selector_parsed).count())
    }

    async fn click(&self, selector: &str) -> Result<(), HarvestError> {
        if !self.exists(selector).await? {
            return Err(HarvestError::extraction(
                selector,
                anyhow!("Nothing to click"),
            ));
        }
        self.clicks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(selector.to_string());
        Ok(())
    }
}
