//! Remote data gateway
//!
//! The application delegates persistence, authentication and file storage to
//! a backend service. This module defines the three seams the view-model
//! talks to and ships two implementations:
//!
//! - [`memory::MemoryBackend`]: in-process, with failure injection and call
//!   counters, for tests
//! - [`local::LocalBackend`]: SQLite documents and accounts plus a blob
//!   directory, for the CLI
//!
//! Documents are schemaless JSON objects. Typed records are produced by the
//! mappers in [`crate::mappers`].
//!
//! # Example
//!
//! ```no_run
//! use libpicshare::backend::{Backend, DocumentStore, Query};
//! use libpicshare::backend::memory::MemoryBackend;
//!
//! # async fn example() -> libpicshare::Result<()> {
//! let backend = Backend::from_shared(std::sync::Arc::new(MemoryBackend::new()));
//! let recent = backend
//!     .documents
//!     .query("posts", &Query::new().where_greater_than("time", 0))
//!     .await?;
//! println!("{} posts", recent.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

pub mod local;
pub mod memory;

/// Field map of a stored document
pub type Fields = Map<String, Value>;

/// Upper bound on writes in a single batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Upper bound on values in a single `In` filter
pub const DEFAULT_MAX_IN_VALUES: usize = 30;

/// A stored document: its key within the collection plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Predicate on a single document field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value
    Eq(String, Value),
    /// Array field contains the value
    ArrayContains(String, Value),
    /// Field equals one of the values
    In(String, Vec<Value>),
    /// Numeric field is strictly greater than the value
    GreaterThan(String, Value),
}

impl Filter {
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(field, value) => fields.get(field) == Some(value),
            Filter::ArrayContains(field, value) => match fields.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Filter::In(field, values) => fields
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Filter::GreaterThan(field, value) => {
                match (fields.get(field).and_then(Value::as_f64), value.as_f64()) {
                    (Some(left), Some(right)) => left > right,
                    _ => false,
                }
            }
        }
    }
}

/// Conjunction of filters over one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn where_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn where_greater_than(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::GreaterThan(field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|f| f.matches(fields))
    }
}

/// Single-field mutation applied atomically by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    /// Append each value not already present in the array field
    ArrayUnion(String, Vec<Value>),
    /// Drop every occurrence of each value from the array field
    ArrayRemove(String, Vec<Value>),
}

impl FieldUpdate {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        FieldUpdate::Set(field.to_string(), value.into())
    }

    pub fn array_union(field: &str, value: impl Into<Value>) -> Self {
        FieldUpdate::ArrayUnion(field.to_string(), vec![value.into()])
    }

    pub fn array_remove(field: &str, value: impl Into<Value>) -> Self {
        FieldUpdate::ArrayRemove(field.to_string(), vec![value.into()])
    }

    pub fn apply(&self, fields: &mut Fields) {
        match self {
            FieldUpdate::Set(field, value) => {
                fields.insert(field.clone(), value.clone());
            }
            FieldUpdate::ArrayUnion(field, values) => {
                let items = array_field(fields, field);
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            FieldUpdate::ArrayRemove(field, values) => {
                let items = array_field(fields, field);
                items.retain(|item| !values.contains(item));
            }
        }
    }
}

/// Array stored under `field`, replacing a missing or non-array value
fn array_field<'a>(fields: &'a mut Fields, field: &str) -> &'a mut Vec<Value> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

/// One document's updates inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    pub collection: String,
    pub id: String,
    pub updates: Vec<FieldUpdate>,
}

/// Keyed document collections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Apply field updates to an existing document
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()>;

    /// All documents in the collection matching every filter, in no particular order
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Apply a batch of updates all-or-nothing, in no particular order
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Rejected` if the batch exceeds
    /// [`max_batch_size`](Self::max_batch_size) and `BackendError::NotFound`
    /// if any target document is missing; nothing is written in either case.
    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<()>;

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }

    fn max_in_values(&self) -> usize {
        DEFAULT_MAX_IN_VALUES
    }
}

/// Email/password accounts with a single current session
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account and sign it in, returning the new user id
    async fn create_account(&self, email: &str, password: &SecretString) -> Result<String>;

    /// Sign in, returning the user id
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<String>;

    async fn sign_out(&self) -> Result<()>;

    async fn send_password_reset(&self, email: &str) -> Result<()>;

    /// User id of the current session, if any
    async fn current_user(&self) -> Result<Option<String>>;
}

/// Durable file storage
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload a local file under `key`, returning a download URL
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String>;
}

/// The three gateway seams, shared by every view-model service
#[derive(Clone)]
pub struct Backend {
    pub documents: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub blobs: Arc<dyn BlobStorage>,
}

impl Backend {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        blobs: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            documents,
            auth,
            blobs,
        }
    }

    /// Use one implementation for all three seams
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: DocumentStore + AuthProvider + BlobStorage + 'static,
    {
        Self {
            documents: backend.clone(),
            auth: backend.clone(),
            blobs: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_filter_eq_and_in() {
        let doc = fields(json!({"userId": "u1", "time": 10}));
        assert!(Filter::Eq("userId".into(), json!("u1")).matches(&doc));
        assert!(!Filter::Eq("userId".into(), json!("u2")).matches(&doc));
        assert!(Filter::In("userId".into(), vec![json!("u2"), json!("u1")]).matches(&doc));
        assert!(!Filter::In("userId".into(), vec![]).matches(&doc));
        assert!(!Filter::Eq("missing".into(), json!("u1")).matches(&doc));
    }

    #[test]
    fn test_filter_array_contains() {
        let doc = fields(json!({"searchTerms": ["sea", "sun"], "likes": null}));
        assert!(Filter::ArrayContains("searchTerms".into(), json!("sun")).matches(&doc));
        assert!(!Filter::ArrayContains("searchTerms".into(), json!("moon")).matches(&doc));
        assert!(!Filter::ArrayContains("likes".into(), json!("u1")).matches(&doc));
    }

    #[test]
    fn test_filter_greater_than_is_strict() {
        let doc = fields(json!({"time": 100}));
        assert!(Filter::GreaterThan("time".into(), json!(99)).matches(&doc));
        assert!(!Filter::GreaterThan("time".into(), json!(100)).matches(&doc));
        assert!(!Filter::GreaterThan("time".into(), json!("x")).matches(&doc));
    }

    #[test]
    fn test_query_is_conjunction() {
        let doc = fields(json!({"userId": "u1", "time": 10}));
        let query = Query::new()
            .where_eq("userId", "u1")
            .where_greater_than("time", 20);
        assert!(!query.matches(&doc));
        assert!(Query::new().matches(&doc));
    }

    #[test]
    fn test_array_union_skips_duplicates_and_creates_field() {
        let mut doc = fields(json!({"likes": ["a"]}));
        FieldUpdate::array_union("likes", "a").apply(&mut doc);
        FieldUpdate::array_union("likes", "b").apply(&mut doc);
        assert_eq!(doc["likes"], json!(["a", "b"]));

        let mut doc = fields(json!({"likes": null}));
        FieldUpdate::array_union("likes", "a").apply(&mut doc);
        assert_eq!(doc["likes"], json!(["a"]));

        let mut doc = Fields::new();
        FieldUpdate::array_union("following", "x").apply(&mut doc);
        assert_eq!(doc["following"], json!(["x"]));
    }

    #[test]
    fn test_array_remove_drops_all_occurrences() {
        let mut doc = fields(json!({"likes": ["a", "b", "a"]}));
        FieldUpdate::array_remove("likes", "a").apply(&mut doc);
        assert_eq!(doc["likes"], json!(["b"]));

        FieldUpdate::array_remove("likes", "zzz").apply(&mut doc);
        assert_eq!(doc["likes"], json!(["b"]));
    }

    #[test]
    fn test_set_overwrites() {
        let mut doc = fields(json!({"userImage": "old"}));
        FieldUpdate::set("userImage", "new").apply(&mut doc);
        assert_eq!(doc["userImage"], json!("new"));
    }
}
