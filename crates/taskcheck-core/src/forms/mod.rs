//! Per-form static configuration.
//!
//! Form configurations are YAML documents validated against an embedded
//! JSON Schema, then registered together with the rule engine for each
//! form id.

mod config;
mod registry;

pub use config::{
    CheckField, FieldLabel, FormDefinition, FormRuleConfig, FormsConfig, FormsConfigError,
    LessonFields, RuleSettings,
};
pub use registry::{Capabilities, FormRegistry, RETURNING_STUDENTS_FORM_ID, TRIAL_CONVERSION_FORM_ID};
