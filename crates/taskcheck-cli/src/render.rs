//! Console presentation of analysis results.

use std::fmt;

use taskcheck_core::{AnalysisOutcome, AnalysisReport};
use taskcheck_runtime::ScanEntry;

/// Human-readable view of a report.
pub struct ReportView<'a> {
    report: &'a AnalysisReport,
    all_fields: bool,
}

impl<'a> ReportView<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self {
            report,
            all_fields: false,
        }
    }

    /// Also list every raw field.
    pub fn with_all_fields(mut self, enabled: bool) -> Self {
        self.all_fields = enabled;
        self
    }
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let analysis = &report.analysis;

        writeln!(f, "Task {}: {}", report.task_id, report.task_title)?;
        writeln!(f, "Form: {} ({})", report.form_name, report.form_id)?;
        writeln!(f, "Link: {}", report.task_link)?;
        writeln!(f, "Fields: {}", report.fields_count)?;

        writeln!(f)?;
        writeln!(f, "Rule violations ({}):", analysis.rule_violations.len())?;
        if analysis.rule_violations.is_empty() {
            writeln!(f, "  none")?;
        }
        for violation in &analysis.rule_violations {
            writeln!(f, "  - {}", violation)?;
        }

        let attendance = &analysis.attendance;
        writeln!(f)?;
        writeln!(
            f,
            "Attendance: {}",
            if attendance.has_problem { "PROBLEM" } else { "ok" }
        )?;
        if !attendance.lesson_summary.is_empty() {
            writeln!(f, "  lessons: {}", attendance.lesson_summary)?;
        }
        for detail in &attendance.problem_details {
            writeln!(f, "  - {}", detail)?;
        }
        if let Some(reason) = attendance.reason() {
            writeln!(f, "  {}", reason)?;
        }

        if !analysis.important_fields.is_empty() {
            writeln!(f)?;
            writeln!(f, "Important fields:")?;
            for (label, value) in analysis.important_fields.iter() {
                writeln!(f, "  {}: {}", label, value)?;
            }
        }

        if !analysis.gaps.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unavailable:")?;
            for gap in &analysis.gaps {
                writeln!(f, "  - {}", gap)?;
            }
        }

        if self.all_fields {
            writeln!(f)?;
            writeln!(f, "All fields:")?;
            for (label, value) in analysis.all_fields.iter() {
                writeln!(f, "  {}: {}", label, value)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Conclusion: {}", analysis.conclusion)
    }
}

/// One summary line for a scanned task.
pub fn scan_line(entry: &ScanEntry) -> String {
    let status = match &entry.outcome {
        AnalysisOutcome::Report(report) => report.analysis.conclusion.to_string(),
        AnalysisOutcome::Error { error } => format!("error: {}", error),
    };
    format!(
        "{}\t#{}\t{}\t{}",
        entry.form_id, entry.task.id, entry.task.title, status
    )
}
