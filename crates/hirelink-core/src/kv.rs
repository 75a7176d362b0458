use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::Credentials;

pub const TOKEN_KEY: &str = "token";
pub const CREDENTIALS_KEY: &str = "credentials";
pub const USER_KEY: &str = "user";

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv storage: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("kv migration: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("kv store poisoned")]
    Poisoned,
}

/// Process-wide persisted string map (auth token, stored credentials, profile).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    async fn remove(&self, key: &str) -> Result<(), KvError>;
}

pub async fn load_credentials(store: &dyn KeyValueStore) -> Result<Option<Credentials>, KvError> {
    let Some(raw) = store.get(CREDENTIALS_KEY).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| KvError::Invalid {
            key: CREDENTIALS_KEY.to_string(),
            reason: e.to_string(),
        })
}

pub async fn save_credentials(
    store: &dyn KeyValueStore,
    credentials: &Credentials,
) -> Result<(), KvError> {
    let raw = serde_json::to_string(credentials).map_err(|e| KvError::Invalid {
        key: CREDENTIALS_KEY.to_string(),
        reason: e.to_string(),
    })?;
    store.set(CREDENTIALS_KEY, &raw).await
}

#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub async fn connect(path: &str) -> Result<Self, KvError> {
        let options = SqliteConnectOptions::new()
            .filename(path.trim_start_matches("sqlite:"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), KvError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<String>, KvError> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT key FROM kv_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let row = sqlx::query_as::<_, (String,)>("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.lock().map_err(|_| KvError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
