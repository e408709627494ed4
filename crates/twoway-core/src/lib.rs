//! twoway core
//!
//! Shared domain model for the two-way SQL engine: diagnostics, the SQL
//! type system used by bind parameters, configuration and reports.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod types;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use types::{SqlType, ParameterDirection};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, DialectConfig, EvaluationConfig, PlaceholderStyle, SeverityThreshold};
