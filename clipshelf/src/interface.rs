//! ClipShelf Interface Definition
//!
//! Shared error types and the capabilities the engine consumes from its host:
//! a document store for persistence, the platform clipboard, and a clock.
//! Everything above the repository talks to the outside world through these.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by a `DocumentStore` implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Document {collection}/{id} changed since it was read")]
    Conflict { collection: String, id: String },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Store task failed: {0}")]
    Join(String),
}

/// Failure converting an image payload to or from its stored text form
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Empty image payload")]
    EmptyPayload,
    #[error("Payload is not validly encoded: {0}")]
    Decode(String),
    #[error("Cannot transcode {mime_type} to PNG: {reason}")]
    Transcode { mime_type: String, reason: String },
}

/// Error type for ClipShelf operations
#[derive(Debug, Error)]
pub enum ClipShelfError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type ClipShelfResult<T> = Result<T, ClipShelfError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by the platform clipboard
#[derive(Debug, Error)]
pub enum ClipboardPortError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Clipboard write rejected: {0}")]
    Rejected(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// A raw JSON document keyed by its `id` field
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

impl Document {
    /// Wrap a JSON object, taking the key from its `id` field
    pub fn from_body(body: Value) -> StoreResult<Self> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| StoreError::InvalidDocument("missing string `id` field".into()))?;
        Ok(Self { id, body })
    }

    pub fn from_record<T: Serialize>(record: &T) -> StoreResult<Self> {
        Self::from_body(serde_json::to_value(record)?)
    }

    pub fn to_record<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Byte length of the serialized JSON body
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }
}

/// Which documents a `find` returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All,
    ById(String),
}

impl Query {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Query::All => true,
            Query::ById(id) => document.id == *id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Ascending sort on a top-level field. Stores may ignore it.
    pub sort: Option<String>,
}

impl FindOptions {
    pub fn sorted_by(field: impl Into<String>) -> Self {
        Self { sort: Some(field.into()) }
    }
}

/// Document-level persistence. No transactions, no counters, no uniqueness
/// beyond the document key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// Insert or replace by id. When `previous` is given the stored document
    /// must still equal it, otherwise the write fails with `Conflict`.
    async fn upsert(&self, collection: &str, document: Document, previous: Option<&Document>) -> StoreResult<()>;

    /// Remove documents by id. Unknown ids are ignored.
    async fn remove(&self, collection: &str, ids: &[String]) -> StoreResult<()>;
}

/// Ascending sort on a top-level field: numbers before strings, missing last.
pub(crate) fn sort_by_field(documents: &mut [Document], field: &str) {
    documents.sort_by(|a, b| compare_field(a.field(field), b.field(field)));
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            Some(Value::Number(_)) => 0,
            Some(Value::String(_)) => 1,
            Some(Value::Bool(_)) => 2,
            _ => 3,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::INFINITY);
            let y = y.as_f64().unwrap_or(f64::INFINITY);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLATFORM CLIPBOARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Current platform clipboard contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardRead {
    Text { value: String },
    Image { payload: Vec<u8>, mime_type: String },
    Empty,
}

#[async_trait]
pub trait ClipboardPort: Send + Sync {
    async fn read_clipboard(&self) -> ClipboardRead;
    async fn write_text(&self, text: &str) -> Result<(), ClipboardPortError>;
    /// Image payloads are always PNG
    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardPortError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOCK
// ═══════════════════════════════════════════════════════════════════════════════

pub trait Clock: Send + Sync {
    /// Unix epoch milliseconds
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_requires_string_id() {
        assert!(Document::from_body(json!({"id": "a", "x": 1})).is_ok());
        assert!(matches!(
            Document::from_body(json!({"id": 7})),
            Err(StoreError::InvalidDocument(_))
        ));
        assert!(Document::from_body(json!({"x": 1})).is_err());
    }

    #[test]
    fn test_sort_by_field_puts_missing_last() {
        let mut docs: Vec<Document> = vec![
            json!({"id": "c"}),
            json!({"id": "b", "order": 5}),
            json!({"id": "a", "order": -2.5}),
        ]
        .into_iter()
        .map(|b| Document::from_body(b).unwrap())
        .collect();

        sort_by_field(&mut docs, "order");
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_query_by_id() {
        let doc = Document::from_body(json!({"id": "x"})).unwrap();
        assert!(Query::All.matches(&doc));
        assert!(Query::ById("x".into()).matches(&doc));
        assert!(!Query::ById("y".into()).matches(&doc));
    }
}
