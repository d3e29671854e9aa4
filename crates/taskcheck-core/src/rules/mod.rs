//! Form rule engines.
//!
//! Each engine checks a task's fields against a reference date and
//! returns human-readable violations in two fixed categories:
//!
//! - `general`: standard fields (teacher, branch, status)
//! - `rule3`: the form's supplementary lesson rule
//!
//! Engines never fail on malformed field data. A configured field that
//! the form template lacks only switches off the checks that read it.
//! A `RuleError` means the engine itself could not run.

mod checks;
mod dates;
mod returning;
mod trial;

pub use dates::{parse_date, parse_time};
pub use returning::ReturningStudentsRules;
pub use trial::TrialConversionRules;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::extract::ExtractFn;
use crate::field::{Field, FormSchema};

/// Errors that stop an engine from producing violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("rule configuration invalid: {0}")]
    Config(String),
}

/// How the reference date is turned into a cutoff instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    /// Everything scheduled before noon of the reference date
    #[default]
    #[serde(rename = "yesterday12")]
    Yesterday12,

    /// Everything scheduled on or before the reference date
    EndOfDay,
}

impl CheckMode {
    /// Latest lesson start (exclusive) that must already be reported.
    pub fn cutoff(&self, reference_date: NaiveDate) -> NaiveDateTime {
        let midnight = reference_date.and_time(NaiveTime::MIN);
        match self {
            CheckMode::Yesterday12 => midnight + TimeDelta::hours(12),
            CheckMode::EndOfDay => midnight + TimeDelta::days(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMode::Yesterday12 => "yesterday12",
            CheckMode::EndOfDay => "end-of-day",
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckMode {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yesterday12" => Ok(CheckMode::Yesterday12),
            "end-of-day" | "end_of_day" => Ok(CheckMode::EndOfDay),
            other => Err(RuleError::Config(format!("unknown check mode '{}'", other))),
        }
    }
}

/// The day before `now` in the reporting zone (`utc_offset_hours` east).
///
/// An out-of-range offset falls back to UTC.
pub fn reference_date(now: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDate {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    let today = now.with_timezone(&offset).date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Violation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    General,
    Rule3,
}

/// Violations found by one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleViolations {
    #[serde(default)]
    pub general: Vec<String>,

    #[serde(default)]
    pub rule3: Vec<String>,
}

impl RuleViolations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: ViolationCategory, message: impl Into<String>) {
        match category {
            ViolationCategory::General => self.general.push(message.into()),
            ViolationCategory::Rule3 => self.rule3.push(message.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.rule3.is_empty()
    }

    pub fn len(&self) -> usize {
        self.general.len() + self.rule3.len()
    }

    /// `general` followed by `rule3`.
    pub fn into_flat(self) -> Vec<String> {
        let mut all = self.general;
        all.extend(self.rule3);
        all
    }
}

/// A form-specific rule engine.
pub trait RuleEngine: Send + Sync {
    /// Form this engine checks.
    fn form_id(&self) -> u64;

    /// Short name for logs.
    fn name(&self) -> &str;

    /// Check a task's fields.
    ///
    /// # Arguments
    ///
    /// * `schema` - Form template (may be a placeholder without fields)
    /// * `fields` - The task's fields
    /// * `extract` - Field lookup shared with the rest of the analysis
    /// * `reference_date` - The reported day, usually yesterday
    /// * `mode` - How `reference_date` becomes a cutoff
    fn check(
        &self,
        schema: &FormSchema,
        fields: &[Field],
        extract: ExtractFn,
        reference_date: NaiveDate,
        mode: CheckMode,
    ) -> Result<RuleViolations, RuleError>;
}
