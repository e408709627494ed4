//! Configuration schema (twoway.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// SQL dialect used when validating templates and rendered SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// MySQL SQL dialect
    MySql,

    /// Generic ANSI SQL
    #[default]
    Ansi,
}

/// Positional placeholder syntax emitted for bind parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `?` (JDBC, ODBC, SQLite, MySQL)
    #[default]
    Question,

    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,

    /// `:1`, `:2`, ... (Oracle)
    Colon,
}

impl PlaceholderStyle {
    /// Render the placeholder for the parameter at `ordinal` (0-based)
    pub fn render(&self, ordinal: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Dollar => format!("${}", ordinal + 1),
            Self::Colon => format!(":{}", ordinal + 1),
        }
    }
}

impl std::str::FromStr for PlaceholderStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "question" | "?" => Ok(Self::Question),
            "dollar" | "$" => Ok(Self::Dollar),
            "colon" | ":" => Ok(Self::Colon),
            other => Err(ConfigError::ParseError(format!("unknown placeholder style '{}'", other))),
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Placeholder syntax
    #[serde(default)]
    pub placeholder: PlaceholderStyle,

    /// Drop the blank line a directive leaves behind when it sits on its own line
    #[serde(default = "default_true")]
    pub collapse_blank_lines: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::default(),
            collapse_blank_lines: true,
        }
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            evaluation: EvaluationConfig::default(),
            severity: SeverityThreshold::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, DialectConfig::Ansi);
        assert_eq!(config.evaluation.placeholder, PlaceholderStyle::Question);
        assert!(config.evaluation.collapse_blank_lines);
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::SqlParseError, Severity::Warn);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::SqlParseError, Severity::Error),
            Severity::Warn
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            dialect = "postgres"

            [evaluation]
            placeholder = "dollar"
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectConfig::Postgres);
        assert_eq!(config.evaluation.placeholder, PlaceholderStyle::Dollar);
        assert!(config.evaluation.collapse_blank_lines);
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twoway.toml");

        let mut config = Config::default();
        config.evaluation.placeholder = PlaceholderStyle::Colon;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.evaluation.placeholder, PlaceholderStyle::Colon);
        assert_eq!(loaded.project_root, dir.path());
    }

    #[test]
    fn placeholder_rendering() {
        assert_eq!(PlaceholderStyle::Question.render(0), "?");
        assert_eq!(PlaceholderStyle::Dollar.render(0), "$1");
        assert_eq!(PlaceholderStyle::Colon.render(2), ":3");
        assert_eq!("dollar".parse::<PlaceholderStyle>().unwrap(), PlaceholderStyle::Dollar);
        assert!("brace".parse::<PlaceholderStyle>().is_err());
    }
}
