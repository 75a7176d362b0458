//! Remote conversation API and the fetcher that normalizes it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use hirelink_core::{
    Conversation, Credentials, KeyValueStore, KvError, TOKEN_KEY, USER_KEY, load_credentials,
};

mod http;
pub mod normalize;

pub use http::{ApiConfig, HttpConversationApi};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("login response carried no token")]
    MissingToken,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable token: the caller should show an empty state.
    #[error("auth: {0}")]
    Auth(String),
    /// Network or server failure: the caller keeps its previous state.
    #[error("transport: {0}")]
    Transport(#[source] ApiError),
}

impl FetchError {
    fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => FetchError::Auth("server rejected token".to_string()),
            other => FetchError::Transport(other),
        }
    }

    fn from_kv(err: KvError) -> Self {
        FetchError::Auth(format!("token store: {}", err))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginSession {
    pub token: String,
    pub user: Option<Value>,
}

/// The four remote operations, each carrying the bearer token.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self, token: &str) -> Result<Value, ApiError>;
    async fn append_reply(
        &self,
        token: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), ApiError>;
    async fn mark_read(&self, token: &str, conversation_id: &str) -> Result<(), ApiError>;
    async fn login(&self, credentials: &Credentials) -> Result<LoginSession, ApiError>;
}

/// Resolves the bearer token from the key-value store and wraps every remote
/// call. A missing or rejected token triggers one login with the stored
/// credentials; the new token is written back.
#[derive(Clone)]
pub struct ConversationFetcher {
    api: Arc<dyn ConversationApi>,
    kv: Arc<dyn KeyValueStore>,
    reauth: Arc<tokio::sync::Mutex<()>>,
}

impl ConversationFetcher {
    pub fn new(api: Arc<dyn ConversationApi>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api,
            kv,
            reauth: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn fetch_all(&self) -> Result<Vec<Conversation>, FetchError> {
        let api = &self.api;
        let value = self
            .authorized(|token| async move { api.list_conversations(&token).await })
            .await?;
        let conversations = normalize::conversations_from_value(&value);
        tracing::debug!(count = conversations.len(), "fetched conversations");
        Ok(conversations)
    }

    pub async fn append_reply(&self, conversation_id: &str, content: &str) -> Result<(), FetchError> {
        let api = &self.api;
        self.authorized(|token| async move {
            api.append_reply(&token, conversation_id, content).await
        })
        .await
    }

    pub async fn mark_read(&self, conversation_id: &str) -> Result<(), FetchError> {
        let api = &self.api;
        self.authorized(|token| async move { api.mark_read(&token, conversation_id).await })
            .await
    }

    /// Logs in explicitly and persists token, credentials and profile.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginSession, FetchError> {
        let session = self.api.login(credentials).await.map_err(FetchError::from_api)?;
        self.persist_session(&session).await?;
        hirelink_core::save_credentials(self.kv.as_ref(), credentials)
            .await
            .map_err(FetchError::from_kv)?;
        Ok(session)
    }

    async fn authorized<T, F, Fut>(&self, op: F) -> Result<T, FetchError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let stored = self.kv.get(TOKEN_KEY).await.map_err(FetchError::from_kv)?;
        let (token, reissued) = match stored.filter(|t| !t.is_empty()) {
            Some(token) => (token, false),
            None => (self.reauthenticate(None).await?, true),
        };
        match op(token.clone()).await {
            Err(ApiError::Unauthorized) if !reissued => {
                tracing::info!("stored token rejected, re-authenticating");
                let token = self.reauthenticate(Some(&token)).await?;
                op(token).await.map_err(FetchError::from_api)
            }
            other => other.map_err(FetchError::from_api),
        }
    }

    async fn reauthenticate(&self, stale: Option<&str>) -> Result<String, FetchError> {
        let _guard = self.reauth.lock().await;
        // Another caller may have refreshed the token while we waited.
        if let Some(current) = self.kv.get(TOKEN_KEY).await.map_err(FetchError::from_kv)? {
            if !current.is_empty() && Some(current.as_str()) != stale {
                return Ok(current);
            }
        }
        let credentials = load_credentials(self.kv.as_ref())
            .await
            .map_err(FetchError::from_kv)?
            .ok_or_else(|| FetchError::Auth("no token and no stored credentials".to_string()))?;
        tracing::info!(email = %credentials.email, "re-authenticating with stored credentials");
        let session = match self.api.login(&credentials).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(%err, "re-authentication failed");
                return Err(FetchError::Auth(format!("re-authentication failed: {}", err)));
            }
        };
        self.persist_session(&session).await?;
        Ok(session.token)
    }

    async fn persist_session(&self, session: &LoginSession) -> Result<(), FetchError> {
        self.kv
            .set(TOKEN_KEY, &session.token)
            .await
            .map_err(FetchError::from_kv)?;
        if let Some(user) = &session.user {
            self.kv
                .set(USER_KEY, &user.to_string())
                .await
                .map_err(FetchError::from_kv)?;
        }
        Ok(())
    }
}
