//! Access to a rendered page: the boundary between the harvesters and whatever renders
//! the source site (a live browser session or static HTML fixtures).

use crate::core::error::HarvestError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// How a field is read relative to its row element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed rendered text of the first match.
    Text,
    /// Raw value of an attribute of the first match.
    Attr(String),
    /// `"true"` when the selector matches, `"false"` otherwise. Never `None`.
    Exists,
}

/// One named value to read from every row matched by a row selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldQuery {
    pub name: &'static str,
    /// Selector relative to the row; an empty selector addresses the row itself.
    pub selector: &'static str,
    pub kind: FieldKind,
}

impl FieldQuery {
    pub fn text(name: &'static str, selector: &'static str) -> Self {
        Self {
            name,
            selector,
            kind: FieldKind::Text,
        }
    }

    pub fn attr(name: &'static str, selector: &'static str, attribute: &str) -> Self {
        Self {
            name,
            selector,
            kind: FieldKind::Attr(attribute.to_string()),
        }
    }

    pub fn exists(name: &'static str, selector: &'static str) -> Self {
        Self {
            name,
            selector,
            kind: FieldKind::Exists,
        }
    }
}

/// Values read from one matched row, keyed by [`FieldQuery::name`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Option<String>>,
}

impl Record {
    pub fn new(values: HashMap<String, Option<String>>) -> Self {
        Self { values }
    }

    /// The field's value, `None` when the selector matched nothing.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|value| value.as_deref())
    }

    /// Reads an [`FieldKind::Exists`] field.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }
}

impl<const N: usize> From<[(&str, Option<&str>); N]> for Record {
    fn from(values: [(&str, Option<&str>); N]) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
                .collect(),
        )
    }
}

/// A named [`PageDocument::query_all`] request, answered as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowQuery {
    pub name: &'static str,
    pub row_selector: &'static str,
    pub fields: Vec<FieldQuery>,
}

impl RowQuery {
    pub fn new(name: &'static str, row_selector: &'static str, fields: Vec<FieldQuery>) -> Self {
        Self {
            name,
            row_selector,
            fields,
        }
    }

    /// Reads the rendered text of every element matching `selector` into a `text` field.
    pub fn text(name: &'static str, selector: &'static str) -> Self {
        Self::new(name, selector, vec![FieldQuery::text("text", "")])
    }
}

/// Rows read by one [`PageDocument::query_batch`] call, keyed by [`RowQuery::name`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    rows: HashMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn new(rows: HashMap<String, Vec<Record>>) -> Self {
        Self { rows }
    }

    pub fn insert(&mut self, name: &str, rows: Vec<Record>) {
        self.rows.insert(name.to_string(), rows);
    }

    /// Rows of the named query; empty when nothing matched or the query was not part of the batch.
    pub fn rows(&self, name: &str) -> &[Record] {
        self.rows.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Text of the first element of a [`RowQuery::text`] query.
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.rows(name).first().and_then(|row| row.get("text"))
    }
}

/// Navigation and queries against the currently rendered document.
///
/// Implementations serialize calls: one document, one caller at a time.
#[async_trait]
pub trait PageDocument: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), HarvestError>;

    /// Trimmed rendered text of the first element matching `selector`.
    async fn query_one(&self, selector: &str) -> Result<Option<String>, HarvestError>;

    /// Reads `fields` from every element matching `row_selector`, in document order.
    async fn query_all(
        &self,
        row_selector: &str,
        fields: &[FieldQuery],
    ) -> Result<Vec<Record>, HarvestError>;

    /// Answers all `queries` against one state of the document. The default runs them one
    /// after another, which only holds for documents that do not change between calls.
    async fn query_batch(&self, queries: &[RowQuery]) -> Result<Snapshot, HarvestError> {
        let mut snapshot = Snapshot::default();
        for query in queries {
            let rows = self.query_all(query.row_selector, &query.fields).await?;
            snapshot.insert(query.name, rows);
        }
        Ok(snapshot)
    }

    async fn count(&self, selector: &str) -> Result<usize, HarvestError>;

    async fn exists(&self, selector: &str) -> Result<bool, HarvestError> {
        Ok(self.count(selector).await? > 0)
    }

    async fn click(&self, selector: &str) -> Result<(), HarvestError>;
}
