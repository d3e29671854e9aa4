//! Access to the task platform.
//!
//! The analyzer only needs three calls from the platform, defined by
//! [`TaskPlatform`]. [`PyrusClient`] implements them over HTTP; tests
//! substitute an in-memory platform.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use taskcheck_core::{FormSchema, Task};

pub mod secrets;

#[cfg(feature = "pyrus")]
mod pyrus;

pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "pyrus")]
pub use pyrus::PyrusClient;

/// Errors from the task platform.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

/// A task listed in a form register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: u64,
    pub title: String,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
        }
    }
}

/// Remote task source.
#[async_trait]
pub trait TaskPlatform: Send + Sync {
    /// Fetch a task. `None` means the platform has no such task.
    async fn get_task(&self, task_id: u64) -> Result<Option<Task>, PlatformError>;

    /// Fetch form metadata. `None` means the platform returned none.
    async fn get_form_meta(&self, form_id: u64) -> Result<Option<FormSchema>, PlatformError>;

    /// List up to `limit` tasks of a form.
    async fn list_form_tasks(
        &self,
        form_id: u64,
        limit: usize,
    ) -> Result<Vec<TaskSummary>, PlatformError>;

    /// Platform name for logs.
    fn name(&self) -> &str;
}
