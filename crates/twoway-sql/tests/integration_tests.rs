//! Integration tests: templates stay runnable SQL before and after evaluation

use serde_json::json;
use twoway_core::{DialectConfig, EvaluationConfig, PlaceholderStyle};
use twoway_eval::{EvaluationOptions, Evaluator};
use twoway_sql::SqlValidator;
use twoway_template::TemplateParser;

const ORDERS: &str = "\
SELECT o.id, o.total
FROM orders o
WHERE o.customer_id = /*customer.id*/42
/*%if since != null*/
  AND o.created_at >= /*since*/'2020-01-01'
/*%end*/
  AND o.status IN /*statuses*/('NEW', 'PAID')
ORDER BY /*#sort*/o.id
LIMIT /*limit*/10";

#[test]
fn raw_and_rendered_text_both_parse() {
    let template = TemplateParser::new().parse_named(Some("orders.sql"), ORDERS).unwrap();
    let validator = SqlValidator::from_dialect(&DialectConfig::Postgres);

    let raw = validator.validate_template(&template).unwrap();
    assert!(raw.is_select());

    let config = EvaluationConfig {
        placeholder: PlaceholderStyle::Dollar,
        ..EvaluationConfig::default()
    };
    let context = json!({
        "customer": {"id": 7},
        "since": "2024-01-01",
        "statuses": ["NEW", "SHIPPED", "PAID"],
        "sort": "o.total DESC",
        "limit": 50
    });
    let evaluated = Evaluator::new(EvaluationOptions::from(&config))
        .evaluate(&template, &context)
        .unwrap();

    assert_eq!(evaluated.parameters.len(), 6);
    assert!(evaluated.sql.contains("IN ($3, $4, $5)"));
    assert!(evaluated.sql.contains("ORDER BY o.total DESC"));

    let rendered = validator.validate_rendered(&evaluated, Some("orders.sql")).unwrap();
    assert_eq!(rendered.statement_count(), 1);
}

#[test]
fn dropped_branch_still_parses() {
    let template = TemplateParser::new().parse(ORDERS).unwrap();
    let context = json!({
        "customer": {"id": 7},
        "since": null,
        "statuses": [],
        "sort": "o.id",
        "limit": 5
    });
    let evaluated = Evaluator::default().evaluate(&template, &context).unwrap();

    assert!(!evaluated.sql.contains("created_at"));
    assert!(evaluated.sql.contains("IN (NULL)"));
    assert!(SqlValidator::new().validate_rendered(&evaluated, None).is_ok());
}

#[test]
fn broken_template_reports_its_name() {
    let template = TemplateParser::new()
        .parse_named(Some("broken.sql"), "SELECT (id FROM t WHERE id = /*id*/1")
        .unwrap();
    let error = SqlValidator::new().validate_template(&template).unwrap_err();

    assert_eq!(error.origin.as_deref(), Some("broken.sql"));
    assert_eq!(
        error.to_diagnostic().location.map(|l| l.to_string()),
        Some("broken.sql".to_string())
    );
}
