//! Local backend: SQLite documents and accounts plus a blob directory
//!
//! Stands in for the hosted backend when running the CLI. Documents are
//! stored as JSON bodies and filtered in process; field updates and batches
//! run inside SQLite transactions so each is atomic.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use super::{AuthProvider, BatchWrite, BlobStorage, Document, DocumentStore, FieldUpdate, Fields, Query};
use crate::config::{expand_path, BackendConfig};
use crate::error::{BackendError, DbError, Result};
use crate::types::{now_millis, ImageMimeType};

#[derive(Clone)]
pub struct LocalBackend {
    pool: SqlitePool,
    blob_dir: PathBuf,
}

impl LocalBackend {
    /// Open (creating if needed) the database and blob directory
    pub async fn new(db_path: &str, blob_dir: &str) -> Result<Self> {
        let db_path = expand_path(db_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the database file if it doesn't exist
        let db_url = format!(
            "sqlite://{}?mode=rwc",
            db_path.to_string_lossy().replace('\\', "/")
        );
        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self {
            pool,
            blob_dir: expand_path(blob_dir),
        })
    }

    pub async fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.database_path, &config.blob_dir).await
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    /// Emails a password reset was requested for, oldest first
    pub async fn reset_requests(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT email FROM password_resets ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(rows.iter().map(|r| r.get("email")).collect())
    }

    async fn establish_session(&self, uid: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session (slot, uid) VALUES (0, ?)
            ON CONFLICT(slot) DO UPDATE SET uid = excluded.uid
            "#,
        )
        .bind(uid)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }
}

fn parse_body(body: &str) -> Result<Fields> {
    Ok(serde_json::from_str(body)?)
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn new_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[async_trait]
impl DocumentStore for LocalBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        match row {
            Some(row) => Ok(Some(Document {
                id: id.to_string(),
                fields: parse_body(row.get("body"))?,
            })),
            None => Ok(None),
        }
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let body = serde_json::to_string(&fields)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        debug!(collection, id, "document written");
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;

        let mut fields = parse_body(row.get("body"))?;
        for update in &updates {
            update.apply(&mut fields);
        }

        sqlx::query("UPDATE documents SET body = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&fields)?)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut documents = Vec::new();
        for row in rows {
            let fields = parse_body(row.get("body"))?;
            if query.matches(&fields) {
                documents.push(Document {
                    id: row.get("id"),
                    fields,
                });
            }
        }
        Ok(documents)
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<()> {
        if writes.len() > self.max_batch_size() {
            return Err(BackendError::Rejected(format!(
                "batch of {} writes exceeds limit of {}",
                writes.len(),
                self.max_batch_size()
            ))
            .into());
        }

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        for write in &writes {
            let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(&write.collection)
                .bind(&write.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?
                .ok_or_else(|| {
                    BackendError::NotFound(format!("{}/{}", write.collection, write.id))
                })?;

            let mut fields = parse_body(row.get("body"))?;
            for update in &write.updates {
                update.apply(&mut fields);
            }

            sqlx::query("UPDATE documents SET body = ? WHERE collection = ? AND id = ?")
                .bind(serde_json::to_string(&fields)?)
                .bind(&write.collection)
                .bind(&write.id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
        }
        tx.commit().await.map_err(DbError::SqlxError)?;
        debug!(writes = writes.len(), "batch committed");
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn create_account(&self, email: &str, password: &SecretString) -> Result<String> {
        let existing = sqlx::query("SELECT uid FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        if existing.is_some() {
            return Err(BackendError::Authentication(
                "The email address is already in use by another account".to_string(),
            )
            .into());
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        let salt = new_salt();
        sqlx::query(
            r#"
            INSERT INTO accounts (uid, email, password_hash, salt, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&uid)
        .bind(email)
        .bind(hash_password(&salt, password.expose_secret()))
        .bind(&salt)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        self.establish_session(&uid).await?;
        info!(uid = %uid, "account created");
        Ok(uid)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<String> {
        let row = sqlx::query("SELECT uid, password_hash, salt FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let uid = match row {
            Some(row) => {
                let salt: String = row.get("salt");
                let stored: String = row.get("password_hash");
                if hash_password(&salt, password.expose_secret()) != stored {
                    None
                } else {
                    Some(row.get::<String, _>("uid"))
                }
            }
            None => None,
        };

        let uid = uid.ok_or_else(|| {
            BackendError::Authentication("The email or password is incorrect".to_string())
        })?;
        self.establish_session(&uid).await?;
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<()> {
        sqlx::query("DELETE FROM session")
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let known = sqlx::query("SELECT uid FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        if known.is_none() {
            return Err(BackendError::NotFound(format!("no account for {}", email)).into());
        }

        sqlx::query("INSERT INTO password_resets (email, requested_at) VALUES (?, ?)")
            .bind(email)
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        info!(email, "password reset queued");
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT uid FROM session WHERE slot = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(row.map(|r| r.get("uid")))
    }
}

#[async_trait]
impl BlobStorage for LocalBackend {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let mime = ImageMimeType::from_path(local_path).ok_or_else(|| {
            BackendError::Storage(format!(
                "unsupported image type: {}",
                local_path.display()
            ))
        })?;

        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BackendError::Rejected(format!("invalid blob key: {}", key)).into());
        }

        let dest = self
            .blob_dir
            .join(format!("{}.{}", key, mime.extension()));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::Storage(e.to_string()))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| BackendError::Storage(format!("{}: {}", local_path.display(), e)))?;

        debug!(key, mime = mime.as_mime_str(), "blob stored");
        Ok(format!("file://{}", dest.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(
            dir.path().join("test.db").to_str().unwrap(),
            dir.path().join("blobs").to_str().unwrap(),
        )
        .await
        .unwrap();
        (backend, dir)
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_documents_persist_and_filter() {
        let (backend, _dir) = setup().await;
        backend
            .set("posts", "p1", fields(json!({"userId": "u1", "searchTerms": ["sea"]})))
            .await
            .unwrap();
        backend
            .set("posts", "p2", fields(json!({"userId": "u2", "searchTerms": ["sky"]})))
            .await
            .unwrap();

        let hits = backend
            .query("posts", &Query::new().where_array_contains("searchTerms", "sky"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p2");

        // set replaces
        backend
            .set("posts", "p1", fields(json!({"userId": "u9"})))
            .await
            .unwrap();
        let doc = backend.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.fields["userId"], "u9");
        assert!(doc.fields.get("searchTerms").is_none());
    }

    #[tokio::test]
    async fn test_update_applies_array_ops() {
        let (backend, _dir) = setup().await;
        backend
            .set("posts", "p1", fields(json!({"likes": ["a"]})))
            .await
            .unwrap();

        backend
            .update(
                "posts",
                "p1",
                vec![
                    FieldUpdate::array_union("likes", "b"),
                    FieldUpdate::array_remove("likes", "a"),
                ],
            )
            .await
            .unwrap();
        let doc = backend.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.fields["likes"], json!(["b"]));

        let missing = backend
            .update("posts", "nope", vec![FieldUpdate::set("x", 1)])
            .await;
        assert!(matches!(
            missing,
            Err(crate::PicshareError::Backend(BackendError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_missing_document() {
        let (backend, _dir) = setup().await;
        backend
            .set("posts", "p1", fields(json!({"userImage": "old"})))
            .await
            .unwrap();

        let result = backend
            .commit_batch(vec![
                BatchWrite {
                    collection: "posts".to_string(),
                    id: "p1".to_string(),
                    updates: vec![FieldUpdate::set("userImage", "new")],
                },
                BatchWrite {
                    collection: "posts".to_string(),
                    id: "gone".to_string(),
                    updates: vec![FieldUpdate::set("userImage", "new")],
                },
            ])
            .await;
        assert!(result.is_err());

        let doc = backend.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.fields["userImage"], "old");
    }

    #[tokio::test]
    async fn test_accounts_and_session_survive_reopen() {
        let (backend, dir) = setup().await;
        let password = SecretString::from("correct horse".to_string());

        let uid = backend.create_account("ada@example.com", &password).await.unwrap();
        assert_eq!(backend.current_user().await.unwrap(), Some(uid.clone()));

        let reopened = LocalBackend::new(
            dir.path().join("test.db").to_str().unwrap(),
            dir.path().join("blobs").to_str().unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(reopened.current_user().await.unwrap(), Some(uid.clone()));

        reopened.sign_out().await.unwrap();
        assert_eq!(reopened.current_user().await.unwrap(), None);

        let wrong = SecretString::from("battery staple".to_string());
        assert!(reopened.sign_in("ada@example.com", &wrong).await.is_err());
        assert_eq!(
            reopened.sign_in("ada@example.com", &password).await.unwrap(),
            uid
        );
        assert!(reopened
            .create_account("ada@example.com", &password)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_password_reset_recorded() {
        let (backend, _dir) = setup().await;
        let password = SecretString::from("secret1".to_string());
        backend.create_account("bo@example.com", &password).await.unwrap();

        assert!(backend.send_password_reset("nobody@example.com").await.is_err());
        backend.send_password_reset("bo@example.com").await.unwrap();
        assert_eq!(
            backend.reset_requests().await.unwrap(),
            vec!["bo@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_upload_copies_image() {
        let (backend, dir) = setup().await;
        let source = dir.path().join("cat.png");
        std::fs::write(&source, b"\x89PNG fake").unwrap();

        let url = backend.upload(&source, "images/abc").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("images/abc.png"));
        let stored = backend.blob_dir().join("images/abc.png");
        assert_eq!(std::fs::read(stored).unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images_and_bad_keys() {
        let (backend, dir) = setup().await;
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(backend.upload(&text, "images/x").await.is_err());

        let image = dir.path().join("cat.jpg");
        std::fs::write(&image, b"jpeg").unwrap();
        assert!(backend.upload(&image, "../escape").await.is_err());

        let missing = dir.path().join("missing.jpg");
        assert!(backend.upload(&missing, "images/y").await.is_err());
    }
}
