//! # taskcheck-runtime
//!
//! Platform access and analysis orchestration for taskcheck.
//!
//! `taskcheck-core` decides; this crate fetches. It provides:
//! - [`TaskPlatform`], the three remote calls analysis needs
//! - [`PyrusClient`], the HTTP implementation (feature `pyrus`)
//! - [`RuntimeConfig`], resolved from environment and an optional file
//! - [`TaskAnalyzer`], which fetches a task and assembles its report
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskcheck_core::{extract, FormRegistry};
//! use taskcheck_runtime::{PyrusClient, RuntimeConfig, TaskAnalyzer};
//!
//! let config = RuntimeConfig::load(None)?;
//! let platform = Arc::new(PyrusClient::from_config(&config)?);
//! let analyzer = TaskAnalyzer::new(platform, Arc::new(FormRegistry::builtin()?), extract)
//!     .with_settings((&config).into());
//!
//! let outcome = analyzer.analyze_outcome(123456789).await;
//! println!("{}", serde_json::to_string_pretty(&outcome)?);
//! ```

pub mod analyzer;
pub mod config;
pub mod platform;

pub use analyzer::{
    AnalyzeError, AnalyzerSettings, Clock, Inspection, ScanEntry, TaskAnalyzer,
    INTERNAL_RULE_ERROR,
};
pub use config::{ConfigError, RuntimeConfig};
pub use platform::{ApiCredential, CredentialSource, PlatformError, TaskPlatform, TaskSummary};

#[cfg(feature = "pyrus")]
pub use platform::PyrusClient;
