//! SQL validation using datafusion-sqlparser-rs

use sqlparser::ast::Statement;
use sqlparser::dialect::{
    BigQueryDialect, Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::{Parser, ParserError};
use twoway_core::{Diagnostic, DiagnosticCode, DialectConfig, Location, Severity};
use twoway_eval::EvaluatedSql;
use twoway_template::Template;

/// Validates raw template text and rendered SQL against a dialect
pub struct SqlValidator {
    dialect: Box<dyn Dialect>,
}

impl SqlValidator {
    /// Validator with the generic dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        let dialect: Box<dyn Dialect> = match dialect {
            DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
            DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
            DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
            DialectConfig::MySql => Box::new(MySqlDialect {}),
            DialectConfig::Ansi => Box::new(GenericDialect {}),
        };
        Self { dialect }
    }

    /// Parse SQL text; `source` names it in errors
    pub fn validate(&self, sql: &str, source: Option<&str>) -> Result<ParsedSql, ValidationError> {
        match Parser::parse_sql(&*self.dialect, sql) {
            Ok(statements) => {
                tracing::debug!(source = source.unwrap_or("<sql>"), statements = statements.len(), "sql parsed");
                Ok(ParsedSql {
                    sql: sql.to_string(),
                    statements,
                })
            }
            Err(error) => Err(ValidationError {
                sql: sql.to_string(),
                error,
                origin: source.map(str::to_string),
            }),
        }
    }

    /// Check that the raw template text is itself runnable SQL
    pub fn validate_template(&self, template: &Template) -> Result<ParsedSql, ValidationError> {
        self.validate(&template.source, Some(&template.id.display_name()))
    }

    /// Check the SQL produced by an evaluation
    pub fn validate_rendered(
        &self,
        evaluated: &EvaluatedSql,
        source: Option<&str>,
    ) -> Result<ParsedSql, ValidationError> {
        self.validate(&evaluated.sql, source)
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL
#[derive(Debug, Clone)]
pub struct ParsedSql {
    pub sql: String,
    pub statements: Vec<Statement>,
}

impl ParsedSql {
    pub fn first_statement(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Check if this is a query statement
    pub fn is_select(&self) -> bool {
        matches!(self.first_statement(), Some(Statement::Query(_)))
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

/// SQL that failed to parse
#[derive(Debug, Clone, thiserror::Error)]
#[error("SQL parse error: {error}")]
pub struct ValidationError {
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,

    /// Template name or file the SQL came from
    pub origin: Option<String>,
}

impl ValidationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::new(
            DiagnosticCode::SqlParseError,
            Severity::Error,
            format!("Failed to parse SQL: {}", self.error),
        );

        if let Some(origin) = &self.origin {
            diag = diag.with_location(Location::new(origin.clone()));
        }

        diag
    }

    /// Check if this is an unsupported syntax error
    pub fn is_unsupported_syntax(&self) -> bool {
        let message = self.error.to_string().to_lowercase();
        message.contains("expected") || message.contains("unexpected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twoway_eval::Evaluator;
    use twoway_template::TemplateParser;

    const SEARCH: &str = "\
SELECT id, name
FROM customer
WHERE 1 = 1
/*%if name != null*/
  AND name = /*name*/'smith'
/*%end*/
  AND status IN /*statuses*/('A', 'B')
ORDER BY /*#order*/id";

    #[test]
    fn raw_template_is_runnable() {
        let template = TemplateParser::new().parse(SEARCH).unwrap();
        let parsed = SqlValidator::new().validate_template(&template).unwrap();

        assert_eq!(parsed.statement_count(), 1);
        assert!(parsed.is_select());
    }

    #[test]
    fn rendered_sql_with_placeholders_parses() {
        let template = TemplateParser::new().parse(SEARCH).unwrap();
        let evaluated = Evaluator::default()
            .evaluate(&template, &json!({"name": "Ann", "statuses": ["A"], "order": "name"}))
            .unwrap();

        assert!(SqlValidator::new().validate_rendered(&evaluated, None).is_ok());
        assert!(SqlValidator::from_dialect(&DialectConfig::Postgres)
            .validate("SELECT * FROM t WHERE id = $1", None)
            .is_ok());
    }

    #[test]
    fn invalid_sql_becomes_diagnostic() {
        let error = SqlValidator::new()
            .validate("SELECT (1 FROM t", Some("broken.sql"))
            .unwrap_err();

        assert!(error.is_unsupported_syntax());
        let diag = error.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::SqlParseError);
        assert_eq!(diag.location.map(|l| l.file), Some("broken.sql".to_string()));
    }

    #[test]
    fn different_dialects() {
        let sql = "SELECT id FROM users WHERE id = /*id*/1";

        for dialect in [
            DialectConfig::Ansi,
            DialectConfig::BigQuery,
            DialectConfig::Postgres,
            DialectConfig::Snowflake,
            DialectConfig::MySql,
        ] {
            assert!(SqlValidator::from_dialect(&dialect).validate(sql, None).is_ok());
        }
    }
}
