//! HTTP client for the action endpoint.
//!
//! Implements [`RemoteCall`] so a [`FeatureDispatcher`] can run its toggle
//! round-trips against a running service. Configuration is via environment
//! variables:
//! - `ADMIN_INSIGHTS_URL` - Base URL (default: `http://localhost:3000/api/v1`)
//! - `ADMIN_INSIGHTS_API_KEY` - API key for authentication (optional for local)
//!
//! [`FeatureDispatcher`]: insights_core::dispatcher::FeatureDispatcher

use std::future::Future;

use insights_core::dispatcher::{RemoteCall, RemoteError};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::models::{AjaxRequest, AjaxResponse, HostUser};

/// Default URL for local development.
const DEFAULT_URL: &str = "http://localhost:3000/api/v1";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

impl From<ClientError> for RemoteError {
    fn from(e: ClientError) -> Self {
        let msg = e.to_string();
        match e {
            ClientError::Forbidden(body) => RemoteError::Rejected(body),
            ClientError::Unauthorized => RemoteError::Rejected(msg),
            _ => RemoteError::Transport(msg),
        }
    }
}

/// Remote-call handle bound to one user and project.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    user: HostUser,
    project_id: Option<i64>,
}

impl HttpRemote {
    /// Create client from environment variables.
    pub fn from_env(user: HostUser, project_id: Option<i64>) -> Self {
        let base_url =
            std::env::var("ADMIN_INSIGHTS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let api_key = std::env::var("ADMIN_INSIGHTS_API_KEY").ok();
        Self::new(base_url, api_key, user, project_id)
    }

    /// Create with explicit configuration.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        user: HostUser,
        project_id: Option<i64>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
            user,
            project_id,
        }
    }

    /// Invoke a named action.
    pub async fn call(&self, action: &str) -> Result<AjaxResponse, ClientError> {
        let url = format!("{}/ajax/{}", self.base_url, action);
        let mut request = self.client.post(&url).json(&AjaxRequest {
            user: self.user.clone(),
            project_id: self.project_id,
            payload: serde_json::Value::Null,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::FORBIDDEN => Err(ClientError::Forbidden(body)),
                StatusCode::BAD_REQUEST => Err(ClientError::BadRequest(body)),
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                _ => Err(ClientError::Server(format!("{}: {}", status, body))),
            }
        }
    }
}

impl RemoteCall for HttpRemote {
    fn ajax(&self, action: &str) -> impl Future<Output = Result<String, RemoteError>> + Send {
        let action = action.to_string();
        async move {
            let response = self.call(&action).await?;
            Ok(response.result.unwrap_or_default())
        }
    }
}
