use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

mod kv;

pub use kv::{
    CREDENTIALS_KEY, KeyValueStore, KvError, MemoryKvStore, SqliteKvStore, TOKEN_KEY, USER_KEY,
    load_credentials, save_credentials,
};

pub const LOG_ENV: &str = "HIRELINK_LOG";

/// Opaque link from a conversation to the job it concerns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub job_id: Option<String>,
    pub job_title: Option<String>,
    pub application_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_name: String,
    pub reference: ConversationRef,
    pub replies: Vec<Reply>,
    pub is_read: bool,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }

    pub fn last_reply(&self) -> Option<&Reply> {
        self.replies.last()
    }

    pub fn reply(&self, reply_id: &str) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == reply_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Reply {
    /// Keeps receipts already observed on `previous`; receipts are never cleared.
    pub fn absorb_receipts(&mut self, previous: &Reply) {
        if self.delivered_at.is_none() {
            self.delivered_at = previous.delivered_at;
        }
        if self.read_at.is_none() {
            self.read_at = previous.read_at;
        }
        self.normalize_receipts();
    }

    /// A read reply was necessarily delivered.
    pub fn normalize_receipts(&mut self) {
        if self.delivered_at.is_none() {
            self.delivered_at = self.read_at;
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    #[serde(rename = "dataUrl")]
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn xdg_state_dir() -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state"))
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn xdg_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Installs the file logger when `HIRELINK_LOG` is set. The value is used as the
/// filter directive; `1`/`true` mean `debug`. Returns whether a subscriber was installed.
pub fn init_logging() -> bool {
    let Ok(raw) = std::env::var(LOG_ENV) else {
        return false;
    };
    let directive = match raw.trim() {
        "" | "1" => "debug".to_string(),
        v if v.eq_ignore_ascii_case("true") => "debug".to_string(),
        v => v.to_string(),
    };
    let path = xdg_state_dir().join("hirelink").join("hirelink.log");
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(_) => return false,
    };
    let (filter, rejected) = match EnvFilter::try_new(&directive) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new("debug"), Some(err)),
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok();
    if installed {
        if let Some(err) = rejected {
            tracing::warn!(%directive, %err, "bad {} filter, logging at debug", LOG_ENV);
        }
        tracing::debug!(path = %path.display(), "logging started");
    }
    installed
}
