//! Integration tests for template evaluation

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use twoway_core::{EvaluationConfig, PlaceholderStyle};
use twoway_eval::{
    EvaluationErrorKind, EvaluationOptions, Evaluator, TemplateContext, TemplateContextBuilder,
};
use twoway_template::TemplateParser;

const BRANCHES: &str = "\
select *
from product
/*%if A > 5*/
where price > 100
/*%else*/
where price <= 100
/*%end*/
";

#[test]
fn if_else_selects_exactly_one_branch() {
    let template = TemplateParser::new().parse(BRANCHES).unwrap();
    let evaluator = Evaluator::default();

    let high = evaluator
        .evaluate(&template, &TemplateContextBuilder::new().var("A", 10).build())
        .unwrap();
    assert_eq!(high.sql, "select *\nfrom product\nwhere price > 100\n");

    let low = evaluator
        .evaluate(&template, &TemplateContextBuilder::new().var("A", 3).build())
        .unwrap();
    assert_eq!(low.sql, "select *\nfrom product\nwhere price <= 100\n");

    let error = evaluator
        .evaluate(&template, &TemplateContext::new())
        .unwrap_err();
    assert_eq!(error.kind, EvaluationErrorKind::UnresolvedVariable("A".to_string()));
    assert_eq!(error.node_path, vec!["if(A > 5)@3"]);
}

#[test]
fn loop_emits_one_placeholder_per_element() {
    let text = "\
select * from customer where id in (
/*%for c : customers*/
  /*c.id*/0/*%if c_has_next*/,/*%end*/
/*%end*/
)";
    let template = TemplateParser::new().parse(text).unwrap();
    let context = json!({"customers": [{"id": 1}, {"id": 2}, {"id": 3}]});

    let evaluated = Evaluator::default().evaluate(&template, &context).unwrap();

    assert_eq!(evaluated.sql.matches('?').count(), 3);
    assert_eq!(evaluated.sql, "select * from customer where id in (\n  ?,\n  ?,\n  ?\n)");
    assert_eq!(evaluated.values(), vec![&json!(1), &json!(2), &json!(3)]);
}

#[test]
fn nth_placeholder_matches_nth_parameter() {
    let text = "\
select * from orders
where status in /*statuses*/('A')
/*%if since != null*/
  and created_at >= /*since*/'2020-01-01'
/*%end*/
/*%for t, i : tags*/
  and tag_/*#i*/0 = /*t*/'x'
/*%end*/
  and owner = /*owner*/'me'
";
    let template = TemplateParser::new().parse(text).unwrap();
    let context = TemplateContextBuilder::new()
        .var("statuses", json!(["NEW", "PAID"]))
        .var("since", "2024-05-01")
        .var("tags", json!(["red", "blue"]))
        .var("owner", "ann")
        .build();

    let options = EvaluationOptions {
        placeholder: PlaceholderStyle::Dollar,
        collapse_blank_lines: true,
    };
    let evaluated = Evaluator::new(options).evaluate(&template, &context).unwrap();

    assert_eq!(evaluated.parameters.len(), 6);
    for (ordinal, parameter) in evaluated.parameters.iter().enumerate() {
        assert_eq!(parameter.ordinal, ordinal);
        assert!(evaluated.sql.contains(&format!("${}", ordinal + 1)));
    }

    let mut last = 0;
    for ordinal in 1..=6 {
        let at = evaluated.sql.find(&format!("${}", ordinal)).unwrap();
        assert!(at >= last, "placeholder ${} out of order", ordinal);
        last = at;
    }

    let values: Vec<_> = evaluated.values().into_iter().cloned().collect();
    assert_eq!(
        values,
        vec![json!("NEW"), json!("PAID"), json!("2024-05-01"), json!("red"), json!("blue"), json!("ann")]
    );
    assert!(evaluated.sql.contains("and tag_0 = $4"));
    assert!(evaluated.sql.contains("and tag_1 = $5"));
}

#[test]
fn marker_free_template_passes_through() {
    let text = "select id,\n\n       name\nfrom customer\n\nwhere active = true\n";
    let template = TemplateParser::new().parse(text).unwrap();

    for context in [json!({}), json!({"anything": 1}), json!(null)] {
        let evaluated = Evaluator::default().evaluate(&template, &context).unwrap();
        assert_eq!(evaluated.sql, text);
        assert!(evaluated.parameters.is_empty());
    }
}

#[test]
fn ordinary_comments_survive_evaluation() {
    let text = "select /* newest first */ * from orders\nwhere id in /*ids*/(/*first id*/1, 2)\nlimit /*max rows*/100";
    let template = TemplateParser::new().parse(text).unwrap();
    let evaluated = Evaluator::default()
        .evaluate(&template, &json!({"ids": [7, 8]}))
        .unwrap();

    assert_eq!(
        evaluated.sql,
        "select /* newest first */ * from orders\nwhere id in (?, ?)\nlimit /*max rows*/100"
    );
    assert_eq!(evaluated.values(), vec![&json!(7), &json!(8)]);
}

#[test]
fn directive_lines_leave_no_blank_lines() {
    let text = "\
select *
from customer
where 1 = 1
/*%if isNotEmpty(name)*/
  and name = /*name*/'x'
/*%end*/
/*%if isNotEmpty(city)*/
  and city = /*city*/'x'
/*%end*/
order by id
";
    let template = TemplateParser::new().parse(text).unwrap();

    let mut vars = HashMap::new();
    vars.insert("name".to_string(), json!("Ann"));
    let evaluated = Evaluator::default().evaluate(&template, &vars).unwrap();

    assert_eq!(
        evaluated.sql,
        "select *\nfrom customer\nwhere 1 = 1\n  and name = ?\norder by id\n"
    );
    assert!(!evaluated.sql.contains("\n\n"));
}

#[test]
fn collapse_can_be_disabled() {
    let config = EvaluationConfig {
        collapse_blank_lines: false,
        ..EvaluationConfig::default()
    };
    let template = TemplateParser::new().parse("a\n/*%if x*/\nb\n/*%end*/\nc").unwrap();
    let evaluated = Evaluator::new(EvaluationOptions::from(&config))
        .evaluate(&template, &json!({"x": true}))
        .unwrap();

    assert_eq!(evaluated.sql, "a\n\nb\n\nc");
}

#[test]
fn one_tree_serves_many_evaluations() {
    let template = std::sync::Arc::new(
        TemplateParser::new()
            .parse("select * from t where id = /*id*/1")
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let template = template.clone();
            std::thread::spawn(move || {
                let context = json!({"id": i});
                Evaluator::default().evaluate(&template, &context).unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let evaluated = handle.join().unwrap();
        assert_eq!(evaluated.values(), vec![&json!(i)]);
    }
}

#[test]
fn evaluated_sql_serializes() {
    let template = TemplateParser::new().parse("select /*a*/1").unwrap();
    let evaluated = Evaluator::default().evaluate(&template, &json!({"a": true})).unwrap();

    let json = serde_json::to_value(&evaluated).unwrap();
    assert_eq!(json["sql"], "select ?");
    assert_eq!(json["parameters"][0]["direction"], "in");
    assert_eq!(json["parameters"][0]["sql_type"]["type"], "bool");
}
