//! In-memory backend for testing
//!
//! Implements all three gateway seams in process. Operations can be made to
//! fail on demand and every call is counted, so tests can check both the
//! resulting state and which requests the view-model issued.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::{
    AuthProvider, BatchWrite, BlobStorage, Document, DocumentStore, FieldUpdate, Fields, Query,
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_IN_VALUES,
};
use crate::error::{BackendError, Result};

/// Gateway operations that can be counted and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Update,
    Query,
    Batch,
    CreateAccount,
    SignIn,
    SignOut,
    PasswordReset,
    Upload,
}

/// Configuration for in-memory backend behavior
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Delay before completing each operation (simulates network latency)
    pub delay: Duration,
    pub max_batch_size: usize,
    pub max_in_values: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(0),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_in_values: DEFAULT_MAX_IN_VALUES,
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password: String,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    accounts: HashMap<String, Account>,
    session: Option<String>,
    blobs: BTreeMap<String, String>,
    reset_requests: Vec<String>,
    failures: HashMap<Op, BackendError>,
    calls: HashMap<Op, usize>,
    batch_sizes: Vec<usize>,
}

pub struct MemoryBackend {
    config: MemoryConfig,
    inner: Mutex<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Backend whose operations each take `delay` to complete
    pub fn with_delay(delay: Duration) -> Self {
        Self::with_config(MemoryConfig {
            delay,
            ..Default::default()
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later call of `op` fail with `error`
    pub fn fail(&self, op: Op, error: BackendError) {
        self.lock().failures.insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Number of times `op` has been called, including failed calls
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Sizes of every committed batch, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    /// Emails a password reset was dispatched to
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    /// Keys of all uploaded blobs
    pub fn blob_keys(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }

    /// Register an account without signing it in
    pub fn insert_account(&self, email: &str, password: &str) -> String {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        uid
    }

    /// Write a document directly, bypassing counters and failures
    pub fn insert_document(&self, collection: &str, id: &str, fields: Fields) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Read a document directly, bypassing counters and failures
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Count the call, wait out the configured delay, then apply any injected failure
    async fn enter(&self, op: Op) -> Result<()> {
        let failure = {
            let mut inner = self.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            inner.failures.get(&op).cloned()
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.enter(Op::Get).await?;
        Ok(self.document(collection, id).map(|fields| Document {
            id: id.to_string(),
            fields,
        }))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.enter(Op::Set).await?;
        self.insert_document(collection, id, fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        self.enter(Op::Update).await?;
        let mut inner = self.lock();
        let fields = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;
        for update in &updates {
            update.apply(fields);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.enter(Op::Query).await?;
        let inner = self.lock();
        let docs = match inner.collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| query.matches(fields))
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<()> {
        self.enter(Op::Batch).await?;
        if writes.len() > self.config.max_batch_size {
            return Err(BackendError::Rejected(format!(
                "batch of {} writes exceeds limit of {}",
                writes.len(),
                self.config.max_batch_size
            ))
            .into());
        }

        let mut inner = self.lock();
        for write in &writes {
            let exists = inner
                .collections
                .get(&write.collection)
                .map(|docs| docs.contains_key(&write.id))
                .unwrap_or(false);
            if !exists {
                return Err(
                    BackendError::NotFound(format!("{}/{}", write.collection, write.id)).into(),
                );
            }
        }

        for write in &writes {
            if let Some(fields) = inner
                .collections
                .get_mut(&write.collection)
                .and_then(|docs| docs.get_mut(&write.id))
            {
                for update in &write.updates {
                    update.apply(fields);
                }
            }
        }
        inner.batch_sizes.push(writes.len());
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    fn max_in_values(&self) -> usize {
        self.config.max_in_values
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn create_account(&self, email: &str, password: &SecretString) -> Result<String> {
        self.enter(Op::CreateAccount).await?;
        let mut inner = self.lock();
        if inner.accounts.contains_key(email) {
            return Err(BackendError::Authentication(
                "The email address is already in use by another account".to_string(),
            )
            .into());
        }
        let uid = uuid::Uuid::new_v4().simple().to_string();
        inner.accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.expose_secret().to_string(),
            },
        );
        inner.session = Some(uid.clone());
        Ok(uid)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<String> {
        self.enter(Op::SignIn).await?;
        let mut inner = self.lock();
        let uid = match inner.accounts.get(email) {
            Some(account) if account.password == password.expose_secret() => account.uid.clone(),
            _ => {
                return Err(BackendError::Authentication(
                    "The email or password is incorrect".to_string(),
                )
                .into())
            }
        };
        inner.session = Some(uid.clone());
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<()> {
        self.enter(Op::SignOut).await?;
        self.lock().session = None;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        self.enter(Op::PasswordReset).await?;
        let mut inner = self.lock();
        if !inner.accounts.contains_key(email) {
            return Err(BackendError::NotFound(format!("no account for {}", email)).into());
        }
        inner.reset_requests.push(email.to_string());
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<String>> {
        Ok(self.lock().session.clone())
    }
}

#[async_trait]
impl BlobStorage for MemoryBackend {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        self.enter(Op::Upload).await?;
        let url = format!("memory://blobs/{}", key);
        self.lock()
            .blobs
            .insert(key.to_string(), local_path.display().to_string());
        Ok(url)
    }
}
