//! Benchmarks for parsing, cached lookup and evaluation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use twoway_cache::TemplateCache;
use twoway_eval::Evaluator;
use twoway_template::TemplateParser;

/// Generate a template with N optional predicates and one IN-list loop
fn generate_template(num_predicates: usize) -> String {
    let mut text = String::from("select *\nfrom orders\nwhere 1 = 1\n");

    for i in 0..num_predicates {
        text.push_str(&format!(
            "/*%if isNotEmpty(p{i})*/\n  and col_{i} = /*p{i}*/'x'\n/*%end*/\n"
        ));
    }
    text.push_str("/*%for id : ids*/\n  or id = /*id*/0\n/*%end*/\n");
    text.push_str("order by /*#sort*/id\n");
    text
}

fn generate_context(num_predicates: usize) -> serde_json::Value {
    let mut vars = serde_json::Map::new();
    for i in 0..num_predicates {
        if i % 2 == 0 {
            vars.insert(format!("p{}", i), json!(format!("value_{}", i)));
        }
    }
    vars.insert("ids".to_string(), json!((0..20).collect::<Vec<_>>()));
    vars.insert("sort".to_string(), json!("created_at desc"));
    serde_json::Value::Object(vars)
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let parser = TemplateParser::new();

    for size in [10, 100, 500] {
        let text = generate_template(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| parser.parse(black_box(text)).unwrap());
        });
    }
    group.finish();
}

fn bench_cached_lookup(c: &mut Criterion) {
    let cache = TemplateCache::new();
    let text = generate_template(100);
    cache.get_or_parse(&text).unwrap();

    c.bench_function("cache_hit_100", |b| {
        b.iter(|| cache.get_or_parse(black_box(&text)).unwrap());
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let parser = TemplateParser::new();
    let evaluator = Evaluator::default();

    for size in [10, 100, 500] {
        let template = parser.parse(&generate_template(size)).unwrap();
        let context = generate_context(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| evaluator.evaluate(black_box(&template), &context).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_cached_lookup, bench_evaluate);
criterion_main!(benches);
