//! Task analysis orchestration.
//!
//! The analyzer fetches a task and its form metadata, then runs the form's
//! rule engine and attendance control and assembles the report. Only
//! platform failures and missing identifiers abort an analysis; anything
//! that goes wrong inside rule evaluation is reported inline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use taskcheck_core::{
    reference_date, AnalysisOutcome, AnalysisReport, AttendanceController, AttendanceVerdict,
    Capabilities, CheckMode, ExtractFn, FormRegistry, FormSchema, ReportBuilder, Task,
};

use crate::config::{RuntimeConfig, DEFAULT_TASK_LINK_BASE, DEFAULT_UTC_OFFSET_HOURS};
use crate::platform::{PlatformError, TaskPlatform, TaskSummary};

/// Prefix of the violation reported when an engine fails.
pub const INTERNAL_RULE_ERROR: &str = "internal rule evaluation error";

/// Errors that abort an analysis.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("task {0} not found")]
    NotFound(u64),

    #[error("task {0} has no form id")]
    MissingFormId(u64),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Source of the current instant.
pub type Clock = fn() -> DateTime<Utc>;

/// Evaluation settings taken from the runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub utc_offset_hours: i32,
    pub check_mode: CheckMode,
    pub task_link_base: String,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            check_mode: CheckMode::default(),
            task_link_base: DEFAULT_TASK_LINK_BASE.to_string(),
        }
    }
}

impl From<&RuntimeConfig> for AnalyzerSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            utc_offset_hours: config.utc_offset_hours,
            check_mode: config.check_mode,
            task_link_base: config.task_link_base.clone(),
        }
    }
}

/// A fetched task together with its report.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub task: Task,
    pub report: AnalysisReport,
}

/// One task visited by a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanEntry {
    pub form_id: u64,
    pub task: TaskSummary,
    pub outcome: AnalysisOutcome,
}

/// Orchestrates the analysis of single tasks.
///
/// Constructed once with the platform, the form registry and the
/// extraction function. Which forms get rules and attendance control is
/// decided by [`Capabilities`], derived from the registry unless set
/// explicitly.
pub struct TaskAnalyzer {
    platform: Arc<dyn TaskPlatform>,
    registry: Arc<FormRegistry>,
    attendance: AttendanceController,
    extract: ExtractFn,
    capabilities: Capabilities,
    settings: AnalyzerSettings,
    clock: Clock,
}

impl TaskAnalyzer {
    pub fn new(
        platform: Arc<dyn TaskPlatform>,
        registry: Arc<FormRegistry>,
        extract: ExtractFn,
    ) -> Self {
        Self {
            platform,
            capabilities: Capabilities::from_registry(&registry),
            attendance: AttendanceController::new(Arc::clone(&registry), extract),
            registry,
            extract,
            settings: AnalyzerSettings::default(),
            clock: Utc::now,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_settings(mut self, settings: AnalyzerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// "Yesterday" in the reporting zone.
    pub fn reference_date(&self) -> NaiveDate {
        reference_date((self.clock)(), self.settings.utc_offset_hours)
    }

    /// Analyze a task by id.
    pub async fn analyze(&self, task_id: u64) -> Result<AnalysisReport, AnalyzeError> {
        self.inspect(task_id).await.map(|inspection| inspection.report)
    }

    /// Analyze a task, folding failures into an `{error}` outcome.
    pub async fn analyze_outcome(&self, task_id: u64) -> AnalysisOutcome {
        match self.analyze(task_id).await {
            Ok(report) => report.into(),
            Err(e) => {
                warn!(task_id, error = %e, "Analysis failed");
                AnalysisOutcome::error(e.to_string())
            }
        }
    }

    /// Analyze a task and keep the fetched task alongside the report.
    pub async fn inspect(&self, task_id: u64) -> Result<Inspection, AnalyzeError> {
        info!(task_id, platform = self.platform.name(), "Fetching task");
        let task = self
            .platform
            .get_task(task_id)
            .await?
            .ok_or(AnalyzeError::NotFound(task_id))?;
        let form_id = task.form_id.ok_or(AnalyzeError::MissingFormId(task_id))?;

        let schema = match self.platform.get_form_meta(form_id).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(form_id, error = %e, "Form metadata unavailable, using placeholder");
                None
            }
        };

        let report = self.evaluate(&task, form_id, schema);
        info!(
            task_id,
            form_id,
            problems = report.problem_count(),
            "Analysis complete"
        );
        Ok(Inspection { task, report })
    }

    /// Run rules and attendance control over an already fetched task.
    pub fn evaluate(&self, task: &Task, form_id: u64, schema: Option<FormSchema>) -> AnalysisReport {
        let definition = self.registry.definition(form_id);
        let form_name = match (&schema, definition) {
            (Some(schema), _) => schema.name.clone(),
            (None, Some(definition)) => definition.name.clone(),
            (None, None) => FormSchema::placeholder(form_id).name,
        };
        let schema = schema.unwrap_or_else(|| FormSchema::placeholder(form_id));

        let mut gaps = Vec::new();
        if definition.is_none() {
            gaps.push(format!(
                "form {} is not registered: no rule checks or attendance control",
                form_id
            ));
        }

        let rule_violations = self.run_rules(task, form_id, &schema, &mut gaps);
        let attendance = self.run_attendance(task, form_id, &mut gaps);

        ReportBuilder::new(task, form_id)
            .form_name(form_name)
            .definition(definition)
            .link_base(self.settings.task_link_base.clone())
            .rule_violations(rule_violations)
            .attendance(attendance)
            .gaps(gaps)
            .build(self.extract)
    }

    fn run_rules(
        &self,
        task: &Task,
        form_id: u64,
        schema: &FormSchema,
        gaps: &mut Vec<String>,
    ) -> Vec<String> {
        if !self.registry.is_known(form_id) {
            return Vec::new();
        }
        let engine = match self.registry.engine(form_id) {
            Some(engine) if self.capabilities.supports_rules(form_id) => engine,
            _ => {
                gaps.push(format!(
                    "rule engine unavailable for form {}: rule checks skipped",
                    form_id
                ));
                return Vec::new();
            }
        };

        let date = self.reference_date();
        let mode = self.settings.check_mode;
        debug!(form_id, engine = engine.name(), %date, %mode, "Running rule engine");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.check(schema, &task.fields, self.extract, date, mode)
        }));
        match outcome {
            Ok(Ok(violations)) => violations.into_flat(),
            Ok(Err(e)) => {
                warn!(form_id, engine = engine.name(), error = %e, "Rule engine failed");
                vec![format!("{}: {}", INTERNAL_RULE_ERROR, e)]
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(form_id, engine = engine.name(), %message, "Rule engine panicked");
                vec![format!("{}: {}", INTERNAL_RULE_ERROR, message)]
            }
        }
    }

    fn run_attendance(&self, task: &Task, form_id: u64, gaps: &mut Vec<String>) -> AttendanceVerdict {
        if !self.registry.is_known(form_id) {
            return AttendanceVerdict::clear();
        }
        if !self.capabilities.supports_attendance(form_id) {
            gaps.push(format!(
                "attendance control unavailable for form {}: attendance not checked",
                form_id
            ));
            return AttendanceVerdict::clear();
        }
        self.attendance.evaluate(&task.fields, form_id)
    }

    /// Analyze up to `limit` tasks of each form, one at a time.
    ///
    /// A failed listing aborts the scan; a failed task becomes an
    /// `{error}` entry.
    pub async fn scan(&self, form_ids: &[u64], limit: usize) -> Result<Vec<ScanEntry>, AnalyzeError> {
        let mut entries = Vec::new();
        for &form_id in form_ids {
            let tasks = self.platform.list_form_tasks(form_id, limit).await?;
            info!(form_id, count = tasks.len(), "Scanning form");

            for task in tasks {
                let outcome = self.analyze_outcome(task.id).await;
                entries.push(ScanEntry {
                    form_id,
                    task,
                    outcome,
                });
            }
        }
        Ok(entries)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "rule engine panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use taskcheck_core::{
        extract, Field, FieldValue, RuleEngine, RuleError, RuleViolations, RETURNING_STUDENTS_FORM_ID,
        TRIAL_CONVERSION_FORM_ID,
    };

    #[derive(Default)]
    struct MockPlatform {
        tasks: HashMap<u64, Task>,
        forms: HashMap<u64, FormSchema>,
        registers: HashMap<u64, Vec<u64>>,
        form_meta_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockPlatform {
        fn with_task(mut self, task: Task) -> Self {
            self.tasks.insert(task.id, task);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TaskPlatform for MockPlatform {
        async fn get_task(&self, task_id: u64) -> Result<Option<Task>, PlatformError> {
            self.calls.lock().push(format!("task {}", task_id));
            Ok(self.tasks.get(&task_id).cloned())
        }

        async fn get_form_meta(&self, form_id: u64) -> Result<Option<FormSchema>, PlatformError> {
            self.calls.lock().push(format!("form {}", form_id));
            if self.form_meta_fails {
                return Err(PlatformError::HttpError("connection reset".into()));
            }
            Ok(self.forms.get(&form_id).cloned())
        }

        async fn list_form_tasks(
            &self,
            form_id: u64,
            limit: usize,
        ) -> Result<Vec<TaskSummary>, PlatformError> {
            self.calls.lock().push(format!("register {}", form_id));
            Ok(self
                .registers
                .get(&form_id)
                .map(|ids| {
                    ids.iter()
                        .take(limit)
                        .map(|id| TaskSummary {
                            id: *id,
                            title: format!("Task #{}", id),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct PanickingEngine;

    impl RuleEngine for PanickingEngine {
        fn form_id(&self) -> u64 {
            TRIAL_CONVERSION_FORM_ID
        }

        fn name(&self) -> &str {
            "panicking"
        }

        fn check(
            &self,
            _schema: &FormSchema,
            _fields: &[Field],
            _extract: ExtractFn,
            _reference_date: NaiveDate,
            _mode: CheckMode,
        ) -> Result<RuleViolations, RuleError> {
            panic!("date column missing");
        }
    }

    struct FailingEngine;

    impl RuleEngine for FailingEngine {
        fn form_id(&self) -> u64 {
            TRIAL_CONVERSION_FORM_ID
        }

        fn name(&self) -> &str {
            "failing"
        }

        fn check(
            &self,
            _schema: &FormSchema,
            _fields: &[Field],
            _extract: ExtractFn,
            _reference_date: NaiveDate,
            _mode: CheckMode,
        ) -> Result<RuleViolations, RuleError> {
            Err(RuleError::Config("lesson table not configured".into()))
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 15, 3, 0, 0).unwrap()
    }

    fn trial_task(id: u64) -> Task {
        Task {
            id,
            form_id: Some(TRIAL_CONVERSION_FORM_ID),
            title: "Trial: Anna".into(),
            fields: vec![
                Field::new(142, "Teacher", "Ivan Sidorov"),
                Field::new(226, "Branch", json!({ "values": ["Pobedy 12"] })),
                Field::new(228, "PE status", json!({ "choice_names": ["PE Start"] })),
                Field::new(181, "1st lesson date", "2025-09-20"),
                Field::new(183, "Attended 1st lesson?", "No"),
                Field::new(187, "Is studying", ""),
            ],
        }
    }

    fn analyzer(platform: MockPlatform, registry: FormRegistry) -> TaskAnalyzer {
        TaskAnalyzer::new(Arc::new(platform), Arc::new(registry), extract).with_clock(fixed_now)
    }

    fn builtin() -> FormRegistry {
        FormRegistry::builtin().unwrap()
    }

    #[tokio::test]
    async fn test_absent_task_is_top_level_error() {
        let analyzer = analyzer(MockPlatform::default(), builtin());
        let outcome = analyzer.analyze_outcome(99).await;

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value, json!({ "error": "task 99 not found" }));
        assert!(value.get("analysis").is_none());
    }

    #[tokio::test]
    async fn test_missing_form_id() {
        let mut task = trial_task(5);
        task.form_id = None;
        let platform = MockPlatform::default().with_task(task);
        let err = analyzer(platform, builtin()).analyze(5).await.unwrap_err();

        assert!(matches!(err, AnalyzeError::MissingFormId(5)));
        assert_eq!(err.to_string(), "task 5 has no form id");
    }

    #[tokio::test]
    async fn test_trial_task_report() {
        let platform = Arc::new(MockPlatform::default().with_task(trial_task(7)));
        let analyzer = TaskAnalyzer::new(platform.clone(), Arc::new(builtin()), extract)
            .with_clock(fixed_now);
        let report = analyzer.analyze(7).await.unwrap();

        assert_eq!(report.form_name, "Conversion after trial lesson");
        assert_eq!(report.task_link, "https://pyrus.com/t#id7");
        assert_eq!(report.fields_count, 6);
        assert!(report.analysis.rule_violations.is_empty());
        assert!(report.analysis.attendance.has_problem);
        assert_eq!(report.analysis.attendance.lesson_summary, "1st lesson");
        assert!(report.analysis.gaps.is_empty());
        assert_eq!(report.problem_count(), 1);
        assert!(report.is_justified());

        assert_eq!(platform.calls(), vec!["task 7", "form 792300"]);
    }

    #[tokio::test]
    async fn test_platform_form_name_wins() {
        let mut platform = MockPlatform::default().with_task(trial_task(7));
        platform.forms.insert(
            TRIAL_CONVERSION_FORM_ID,
            FormSchema::from_value(TRIAL_CONVERSION_FORM_ID, &json!({ "name": "Конверсия" })),
        );
        let report = analyzer(platform, builtin()).analyze(7).await.unwrap();
        assert_eq!(report.form_name, "Конверсия");
    }

    #[tokio::test]
    async fn test_form_meta_failure_is_tolerated() {
        let mut platform = MockPlatform::default().with_task(trial_task(8));
        platform.form_meta_fails = true;
        let report = analyzer(platform, builtin()).analyze(8).await.unwrap();

        assert_eq!(report.form_name, "Conversion after trial lesson");
        assert!(report.analysis.attendance.has_problem);
    }

    #[tokio::test]
    async fn test_overdue_lesson_reported() {
        let mut task = trial_task(9);
        task.fields.push(Field::new(196, "2nd lesson date", "13.09.2025"));
        task.fields.push(Field::new(197, "2nd lesson time", "10:30"));
        let report = analyzer(MockPlatform::default().with_task(task), builtin())
            .analyze(9)
            .await
            .unwrap();

        assert_eq!(report.analysis.rule_violations.len(), 1);
        assert!(report.analysis.rule_violations[0].contains("2025-09-13 at 10:30"));
        assert_eq!(report.problem_count(), 2);
    }

    #[tokio::test]
    async fn test_engine_panic_becomes_violation() {
        let mut registry = builtin();
        assert!(registry.register_engine(Arc::new(PanickingEngine)));
        let report = analyzer(MockPlatform::default().with_task(trial_task(10)), registry)
            .analyze(10)
            .await
            .unwrap();

        assert_eq!(
            report.analysis.rule_violations,
            vec!["internal rule evaluation error: date column missing".to_string()]
        );
        assert!(report.analysis.attendance.has_problem);
    }

    #[tokio::test]
    async fn test_engine_error_becomes_violation() {
        let mut registry = builtin();
        registry.register_engine(Arc::new(FailingEngine));
        let report = analyzer(MockPlatform::default().with_task(trial_task(11)), registry)
            .analyze(11)
            .await
            .unwrap();

        assert_eq!(report.analysis.rule_violations.len(), 1);
        assert!(report.analysis.rule_violations[0].starts_with(INTERNAL_RULE_ERROR));
        assert!(report.analysis.rule_violations[0].contains("lesson table not configured"));
    }

    #[tokio::test]
    async fn test_template_without_time_field_keeps_general_violations() {
        let mut task = trial_task(14);
        task.fields.retain(|f| ![142, 226, 228].contains(&f.id));
        task.fields
            .push(Field::new(228, "PE status", json!({ "choice_names": ["Lost"] })));
        let mut platform = MockPlatform::default().with_task(task);
        platform.forms.insert(
            TRIAL_CONVERSION_FORM_ID,
            FormSchema::from_value(
                TRIAL_CONVERSION_FORM_ID,
                &json!({ "name": "Trial", "fields": [
                    { "id": 142 }, { "id": 226 }, { "id": 228 },
                    { "id": 181 }, { "id": 182 }, { "id": 183 },
                    { "id": 187 }, { "id": 196 }, { "id": 198 }
                ] }),
            ),
        );

        let report = analyzer(platform, builtin()).analyze(14).await.unwrap();
        let violations = &report.analysis.rule_violations;

        assert_eq!(violations.len(), 3);
        assert!(violations.iter().all(|v| !v.starts_with(INTERNAL_RULE_ERROR)));
        assert!(violations[0].starts_with("Teacher (ID:142)"));
        assert!(violations[1].starts_with("Branch (ID:226)"));
        assert!(violations[2].contains("'Lost'"));
    }

    fn blank_extract(_fields: &[Field], _field_id: u64) -> FieldValue {
        FieldValue::Missing
    }

    #[tokio::test]
    async fn test_injected_extractor_drives_rules_too() {
        let platform = MockPlatform::default().with_task(trial_task(15));
        let report = TaskAnalyzer::new(Arc::new(platform), Arc::new(builtin()), blank_extract)
            .with_clock(fixed_now)
            .analyze(15)
            .await
            .unwrap();

        // Teacher, branch and status all read as blank
        assert_eq!(report.analysis.rule_violations.len(), 3);
        assert!(report
            .analysis
            .rule_violations
            .iter()
            .all(|v| v.ends_with("is not filled")));
    }

    #[tokio::test]
    async fn test_missing_capability_is_a_gap() {
        let registry = builtin();
        let capabilities = Capabilities::from_registry(&registry)
            .without_rules(TRIAL_CONVERSION_FORM_ID)
            .without_attendance(TRIAL_CONVERSION_FORM_ID);
        let report = analyzer(MockPlatform::default().with_task(trial_task(12)), registry)
            .with_capabilities(capabilities)
            .analyze(12)
            .await
            .unwrap();

        assert!(report.analysis.rule_violations.is_empty());
        assert!(!report.analysis.attendance.has_problem);
        assert_eq!(report.analysis.gaps.len(), 2);
        assert!(report.analysis.gaps[0].contains("rule engine unavailable"));
        assert!(report.analysis.gaps[1].contains("attendance control unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_form_yields_empty_analysis() {
        let mut task = trial_task(13);
        task.form_id = Some(555);
        let report = analyzer(MockPlatform::default().with_task(task), builtin())
            .analyze(13)
            .await
            .unwrap();

        assert_eq!(report.form_name, "Form 555");
        assert!(report.analysis.rule_violations.is_empty());
        assert!(!report.analysis.attendance.has_problem);
        assert!(report.analysis.important_fields.is_empty());
        assert_eq!(report.analysis.all_fields.len(), 6);
        assert_eq!(report.analysis.gaps.len(), 1);
        assert!(!report.is_justified());
    }

    #[tokio::test]
    async fn test_scan_is_sequential() {
        let mut platform = MockPlatform::default()
            .with_task(trial_task(21))
            .with_task(trial_task(22));
        platform
            .registers
            .insert(TRIAL_CONVERSION_FORM_ID, vec![21, 22, 23]);
        let platform = Arc::new(platform);
        let analyzer = TaskAnalyzer::new(platform.clone(), Arc::new(builtin()), extract)
            .with_clock(fixed_now);

        let entries = analyzer
            .scan(&[TRIAL_CONVERSION_FORM_ID, RETURNING_STUDENTS_FORM_ID], 3)
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries[0].outcome.report().is_some());
        assert!(entries[2].outcome.report().is_none());
        assert_eq!(
            platform.calls(),
            vec![
                "register 792300",
                "task 21",
                "form 792300",
                "task 22",
                "form 792300",
                "task 23",
                "register 2304918",
            ]
        );
    }

    #[test]
    fn test_reference_date_uses_reporting_zone() {
        let analyzer = analyzer(MockPlatform::default(), builtin());
        assert_eq!(
            analyzer.reference_date(),
            NaiveDate::from_ymd_opt(2025, 9, 14).unwrap()
        );

        let utc = analyzer.with_settings(AnalyzerSettings {
            utc_offset_hours: -5,
            ..AnalyzerSettings::default()
        });
        assert_eq!(utc.reference_date(), NaiveDate::from_ymd_opt(2025, 9, 13).unwrap());
    }
}
