//! `twoway check` output (report.json)

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::diagnostic::{Diagnostic, Severity};

/// Report format version; bump `major` when a field changes meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    pub major: u32,
    pub minor: u32,
}

impl ReportVersion {
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Counts by severity plus the number of templates checked
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub templates_checked: usize,
}

/// Result of checking a set of templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: ReportVersion,

    /// RFC 3339, UTC
    pub timestamp: String,
    pub summary: ReportSummary,

    /// Names of the templates checked, in check order
    #[serde(default)]
    pub templates: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            templates: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let mut report = Self::new();
        for diagnostic in diagnostics {
            report.add_diagnostic(diagnostic);
        }
        report
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }

        self.summary.total += 1;
        self.diagnostics.push(diagnostic);
    }

    /// Record a checked template
    pub fn mark_checked(&mut self, template: impl Into<String>) {
        self.templates.push(template.into());
        self.summary.templates_checked += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Templates with at least one error-level diagnostic, sorted
    pub fn failed_templates(&self) -> Vec<&str> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .filter_map(|d| d.location.as_ref().map(|l| l.file.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticCode, Location};

    #[test]
    fn empty_report() {
        let report = Report::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_errors());
        assert!(report.failed_templates().is_empty());
    }

    #[test]
    fn report_with_diagnostics() {
        let diagnostics = vec![
            Diagnostic::new(DiagnosticCode::TemplateUnterminatedBlock, Severity::Error, "Unclosed block")
                .with_location(Location::with_line("b.sql", 3)),
            Diagnostic::new(DiagnosticCode::SqlParseError, Severity::Error, "Bad SQL")
                .with_location(Location::new("a.sql")),
            Diagnostic::new(DiagnosticCode::TemplateParseError, Severity::Error, "Duplicate else")
                .with_location(Location::with_line("b.sql", 9)),
            Diagnostic::new(DiagnosticCode::Info, Severity::Info, "All good")
                .with_location(Location::new("c.sql")),
        ];

        let mut report = Report::from_diagnostics(diagnostics);
        for name in ["a.sql", "b.sql", "c.sql"] {
            report.mark_checked(name);
        }

        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.errors, 3);
        assert_eq!(report.summary.info, 1);
        assert_eq!(report.summary.templates_checked, 3);
        assert_eq!(report.templates, vec!["a.sql", "b.sql", "c.sql"]);
        assert_eq!(report.failed_templates(), vec!["a.sql", "b.sql"]);
        assert!(report.has_errors());
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut report = Report::new();
        report.mark_checked("users.sql");

        let json = report.to_json().unwrap();
        assert!(json.contains("\"templates_checked\": 1"));

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
