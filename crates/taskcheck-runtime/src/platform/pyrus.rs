//! Pyrus REST client.
//!
//! Authenticates with login + security key, caches the bearer token for
//! the configured lifetime and drops it when the platform answers 401.
//! There is no retry: a failed call surfaces as a single error.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use taskcheck_core::{FormSchema, Task};

use super::secrets::{ApiCredential, CredentialSource};
use super::{PlatformError, TaskPlatform, TaskSummary};
use crate::config::RuntimeConfig;

struct CachedToken {
    credential: ApiCredential,
    issued_at: Instant,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    login: &'a str,
    security_key: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the Pyrus API.
pub struct PyrusClient {
    base_url: String,
    login: String,
    security_key: ApiCredential,
    token_ttl: Duration,
    timeout: Duration,
    client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for PyrusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyrusClient")
            .field("base_url", &self.base_url)
            .field("login", &self.login)
            .field("security_key", &self.security_key)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl PyrusClient {
    /// Create a client with explicit settings.
    pub fn new(
        base_url: impl Into<String>,
        login: impl Into<String>,
        security_key: ApiCredential,
        token_ttl: Duration,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::HttpError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            login: login.into(),
            security_key,
            token_ttl,
            timeout,
            client,
            token: RwLock::new(None),
        })
    }

    /// Create a client from runtime configuration.
    ///
    /// Fails when the login or the security key is missing.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, PlatformError> {
        let login = config
            .login
            .clone()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                PlatformError::NotConfigured(
                    "login required: set 'login' in config or PYRUS_LOGIN environment variable"
                        .to_string(),
                )
            })?;
        let security_key = config.security_key.clone().ok_or_else(|| {
            PlatformError::NotConfigured(
                "security key required: set 'security_key' in config or PYRUS_SECURITY_KEY environment variable"
                    .to_string(),
            )
        })?;

        Self::new(
            config.api_url.clone(),
            login,
            security_key,
            config.token_ttl,
            config.request_timeout,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn cached_token(&self) -> Option<ApiCredential> {
        self.token
            .read()
            .as_ref()
            .filter(|t| t.issued_at.elapsed() < self.token_ttl)
            .map(|t| t.credential.clone())
    }

    /// Forget the cached access token.
    pub fn invalidate_token(&self) {
        *self.token.write() = None;
    }

    pub fn has_token(&self) -> bool {
        self.cached_token().is_some()
    }

    async fn access_token(&self) -> Result<ApiCredential, PlatformError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let token = self.authenticate().await?;
        *self.token.write() = Some(CachedToken {
            credential: token.clone(),
            issued_at: Instant::now(),
        });
        Ok(token)
    }

    async fn authenticate(&self) -> Result<ApiCredential, PlatformError> {
        info!(
            login = %self.login,
            credential = self.security_key.name(),
            source = %self.security_key.source(),
            "Authenticating with Pyrus"
        );

        // SECURITY: the key is exposed only for the request body
        let response = self
            .client
            .post(self.endpoint("auth"))
            .json(&AuthRequest {
                login: &self.login,
                security_key: self.security_key.expose(),
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        match body.access_token.filter(|t| !t.is_empty()) {
            Some(token) if status.is_success() => Ok(ApiCredential::new(
                token,
                CredentialSource::Issued,
                "access token",
            )),
            _ => Err(PlatformError::AuthError(
                body.error
                    .unwrap_or_else(|| format!("no access token (status {})", status.as_u16())),
            )),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> PlatformError {
        if e.is_timeout() {
            PlatformError::Timeout(self.timeout)
        } else {
            PlatformError::HttpError(e.to_string())
        }
    }

    /// GET a path. `Ok(None)` on 404.
    async fn get_json(&self, path: &str) -> Result<Option<JsonValue>, PlatformError> {
        let token = self.access_token().await?;
        debug!(path, "GET");

        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "Access token rejected, dropping it");
            self.invalidate_token();
            return Err(PlatformError::AuthError("access token rejected".to_string()));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(JsonValue::as_str)
                .unwrap_or("unexpected response")
                .to_string();
            return Err(PlatformError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Some(body))
    }
}

#[async_trait]
impl TaskPlatform for PyrusClient {
    async fn get_task(&self, task_id: u64) -> Result<Option<Task>, PlatformError> {
        let Some(body) = self.get_json(&format!("tasks/{}", task_id)).await? else {
            return Ok(None);
        };
        match body.get("task") {
            None | Some(JsonValue::Null) => Ok(None),
            Some(raw) => Task::from_value(raw).map(Some).ok_or_else(|| {
                PlatformError::ParseError(format!("task {} has no numeric id", task_id))
            }),
        }
    }

    async fn get_form_meta(&self, form_id: u64) -> Result<Option<FormSchema>, PlatformError> {
        let body = self.get_json(&format!("forms/{}", form_id)).await?;
        Ok(body.map(|raw| FormSchema::from_value(form_id, &raw)))
    }

    async fn list_form_tasks(
        &self,
        form_id: u64,
        limit: usize,
    ) -> Result<Vec<TaskSummary>, PlatformError> {
        let path = format!("forms/{}/register?item_count={}", form_id, limit);
        let Some(body) = self.get_json(&path).await? else {
            return Ok(Vec::new());
        };

        let tasks = body
            .get("tasks")
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Task::from_value)
                    .map(|task| TaskSummary::from(&task))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();
        Ok(tasks)
    }

    fn name(&self) -> &str {
        "pyrus"
    }
}
