use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use hirelink_core::Credentials;

use crate::{ApiError, ConversationApi, LoginSession};

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub conversations_path: String,
    pub reply_path: String,
    pub mark_read_path: String,
    pub login_path: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            conversations_path: "/api/trpc/messages.getAll".to_string(),
            reply_path: "/api/trpc/messages.reply".to_string(),
            mark_read_path: "/api/trpc/messages.markAsRead".to_string(),
            login_path: "/api/auth/login/".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl ApiConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// `ConversationApi` over the platform's tRPC-style HTTP endpoints.
#[derive(Clone)]
pub struct HttpConversationApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpConversationApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn post_json(&self, token: Option<&str>, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.config.endpoint(path);
        tracing::debug!(url = %url, "POST");
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        read_response(request.send().await?).await
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn list_conversations(&self, token: &str) -> Result<Value, ApiError> {
        let url = self.config.endpoint(&self.config.conversations_path);
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        read_response(response).await
    }

    async fn append_reply(
        &self,
        token: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        self.post_json(
            Some(token),
            &self.config.reply_path,
            &reply_body(conversation_id, content),
        )
        .await
        .map(|_| ())
    }

    async fn mark_read(&self, token: &str, conversation_id: &str) -> Result<(), ApiError> {
        self.post_json(
            Some(token),
            &self.config.mark_read_path,
            &mark_read_body(conversation_id),
        )
        .await
        .map(|_| ())
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginSession, ApiError> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let value = self.post_json(None, &self.config.login_path, &body).await?;
        login_session_from_value(&value)
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized);
    }
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Numeric ids travel as numbers, everything else as strings.
fn id_value(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

pub(crate) fn reply_body(conversation_id: &str, content: &str) -> Value {
    json!({
        "json": {
            "conversationId": id_value(conversation_id),
            "content": content,
        }
    })
}

pub(crate) fn mark_read_body(conversation_id: &str) -> Value {
    json!({ "json": { "conversationId": id_value(conversation_id) } })
}

pub(crate) fn login_session_from_value(value: &Value) -> Result<LoginSession, ApiError> {
    let token = value
        .pointer("/tokens/access")
        .or_else(|| value.get("token"))
        .or_else(|| value.get("accessToken"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)?;
    Ok(LoginSession {
        token: token.to_string(),
        user: value.get("user").filter(|u| !u.is_null()).cloned(),
    })
}
