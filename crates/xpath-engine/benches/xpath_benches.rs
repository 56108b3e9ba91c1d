use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use xpath_engine::engine::runtime::{DynamicContextBuilder, StaticContextBuilder};
use xpath_engine::model::simple::{SimpleNode, doc, elem, text};
use xpath_engine::{CompiledExpressionCache, EvaluationOptions, Evaluator, Language, Variables, compile};

fn create_document(sections: usize, items: usize) -> SimpleNode {
    let mut body = elem("body");
    for i in 0..sections {
        let mut section = elem("section").attr("id", &format!("s{i}"));
        for j in 0..items {
            section = section.child(
                elem("item")
                    .attr("class", if j % 3 == 0 { "odd" } else { "plain" })
                    .attr("index", &j.to_string())
                    .child(elem("name").child(text(&format!("item {j} of {i}")))),
            );
        }
        body = body.child(section);
    }
    doc().child(elem("html").child(body)).build()
}

const QUERIES: [&str; 8] = [
    "//item",
    "//item[@class = 'odd']",
    "//section[@id = 's42']/item[3]",
    "count(//name[contains(., '7')])",
    "//section/item[position() < 5]/name",
    "(//item)[last()]",
    "//item[@index = '2']/ancestor::section",
    "some $s in //section satisfies $s/item[@index = '19']",
];

fn bench_evaluation(c: &mut Criterion) {
    let document = create_document(100, 20);
    let static_ctx = StaticContextBuilder::new().build();
    let mut group = c.benchmark_group("evaluate");
    for query in QUERIES {
        let compiled = compile(query, &static_ctx).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(query), &compiled, |b, compiled| {
            b.iter(|| {
                let ctx = DynamicContextBuilder::new().with_context_node(document.clone()).build();
                black_box(compiled.evaluate_items(&ctx).unwrap().len())
            });
        });
    }
    group.finish();
}

fn bench_first_match(c: &mut Criterion) {
    let document = create_document(200, 20);
    let evaluator = Evaluator::<SimpleNode>::new();
    let options = EvaluationOptions::new();
    c.bench_function("first_node/lazy", |b| {
        b.iter(|| {
            evaluator
                .evaluate_to_first_node(black_box("//item[@class = 'odd']"), Some(&document), &Variables::new(), &options)
                .unwrap()
        });
    });
}

fn bench_compile_cache(c: &mut Criterion) {
    let static_ctx = StaticContextBuilder::new().with_namespace("p", "urn:p").build();
    let mut group = c.benchmark_group("compile");
    group.bench_function("cold", |b| {
        b.iter(|| compile(black_box("//section[@id = 's1']/item[p:x or name]"), &static_ctx).unwrap());
    });
    let cache = Arc::new(CompiledExpressionCache::new());
    group.bench_function("cached", |b| {
        b.iter(|| {
            cache
                .compile(black_box("//section[@id = 's1']/item[p:x or name]"), &static_ctx, Language::XPath3, false)
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_evaluation, bench_first_match, bench_compile_cache);
criterion_main!(benches);
