//! SQLite document store
//!
//! One `documents` table holding JSON bodies keyed by (collection, id).
//! Uses r2d2 connection pooling to allow concurrent reads without mutex blocking;
//! all statements run on tokio's blocking pool.

use crate::interface::{Document, DocumentStore, FindOptions, Query, StoreError, StoreResult};
use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::from(e).into()
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        DatabaseError::from(e).into()
    }
}

/// Thread-safe document store using connection pooling
///
/// Cloning is cheap and shares the pool.
/// WAL mode enables readers to proceed without blocking each other.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDocumentStore {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA mmap_size=67108864;
                    PRAGMA cache_size=-32000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
        "#)?;
        Ok(())
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn find_blocking(&self, collection: &str, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let conn = self.get_conn()?;

        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?1");
        let mut values: Vec<rusqlite::types::Value> = vec![collection.to_string().into()];

        if let Query::ById(id) = query {
            sql.push_str(" AND id = ?2");
            values.push(id.clone().into());
        }

        if let Some(field) = &options.sort {
            if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(StoreError::InvalidDocument(format!("unsupported sort field `{}`", field)));
            }
            // Missing fields sort last, numbers before text
            let n = values.len() + 1;
            sql.push_str(&format!(" ORDER BY json_extract(body, ?{n}) IS NULL, json_extract(body, ?{n})"));
            values.push(format!("$.{}", field).into());
        }

        let mut stmt = conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| Document::from_body(serde_json::from_str(body)?))
            .collect()
    }

    fn upsert_blocking(&self, collection: &str, document: &Document, previous: Option<&Document>) -> StoreResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        if let Some(previous) = previous {
            let current: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, document.id],
                    |row| row.get(0),
                )
                .optional()?;
            let current = current
                .map(|body| serde_json::from_str::<serde_json::Value>(&body))
                .transpose()?;
            if current.as_ref() != Some(&previous.body) {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    id: document.id.clone(),
                });
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, document.id, serde_json::to_string(&document.body)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove_blocking(&self, collection: &str, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let conn = self.get_conn()?;
        let placeholders = (0..ids.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>().join(",");
        let sql = format!(
            "DELETE FROM documents WHERE collection = ?1 AND id IN ({})",
            placeholders
        );

        let mut values: Vec<rusqlite::types::Value> = vec![collection.to_string().into()];
        values.extend(ids.iter().map(|id| id.clone().into()));
        conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(())
    }

    /// Run a blocking closure against a pool handle on tokio's blocking pool
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(SqliteDocumentStore) -> StoreResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let (collection, query, options) = (collection.to_string(), query.clone(), options.clone());
        self.run(move |db| db.find_blocking(&collection, &query, &options)).await
    }

    async fn upsert(&self, collection: &str, document: Document, previous: Option<&Document>) -> StoreResult<()> {
        let collection = collection.to_string();
        let previous = previous.cloned();
        self.run(move |db| db.upsert_blocking(&collection, &document, previous.as_ref())).await
    }

    async fn remove(&self, collection: &str, ids: &[String]) -> StoreResult<()> {
        let (collection, ids) = (collection.to_string(), ids.to_vec());
        self.run(move |db| db.remove_blocking(&collection, &ids)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: serde_json::Value) -> Document {
        Document::from_body(body).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let db = SqliteDocumentStore::open_in_memory().unwrap();
        db.upsert("items", doc(json!({"id": "a", "order": 2})), None).await.unwrap();
        db.upsert("items", doc(json!({"id": "b", "order": 1})), None).await.unwrap();
        db.upsert("other", doc(json!({"id": "a", "order": 0})), None).await.unwrap();

        let all = db.find("items", &Query::All, &FindOptions::sorted_by("order")).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let one = db.find("other", &Query::ById("a".into()), &FindOptions::default()).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].body["order"], 0);
        assert_eq!(db.count("items").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sort_puts_null_last() {
        let db = SqliteDocumentStore::open_in_memory().unwrap();
        db.upsert("items", doc(json!({"id": "n", "order": null})), None).await.unwrap();
        db.upsert("items", doc(json!({"id": "m", "order": -1.5})), None).await.unwrap();

        let all = db.find("items", &Query::All, &FindOptions::sorted_by("order")).await.unwrap();
        assert_eq!(all[0].id, "m");
        assert_eq!(all[1].id, "n");

        let bad = db.find("items", &Query::All, &FindOptions::sorted_by("order; DROP TABLE documents")).await;
        assert!(matches!(bad, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_replace_remove_and_conflict() {
        let db = SqliteDocumentStore::open_in_memory().unwrap();
        let v1 = doc(json!({"id": "a", "v": 1}));
        db.upsert("items", v1.clone(), None).await.unwrap();

        let v2 = doc(json!({"id": "a", "v": 2}));
        db.upsert("items", v2.clone(), Some(&v1)).await.unwrap();
        assert_eq!(db.count("items").unwrap(), 1);

        let stale = db.upsert("items", doc(json!({"id": "a", "v": 3})), Some(&v1)).await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));

        db.remove("items", &["a".to_string(), "zzz".to_string()]).await.unwrap();
        db.remove("items", &[]).await.unwrap();
        assert_eq!(db.count("items").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shelf.sqlite");

        {
            let db = SqliteDocumentStore::open(&path).unwrap();
            db.upsert("items", doc(json!({"id": "keep"})), None).await.unwrap();
            assert!(db.database_size().unwrap() > 0);
        }

        let db = SqliteDocumentStore::open(&path).unwrap();
        let all = db.find("items", &Query::All, &FindOptions::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "keep");
    }
}
