//! Criterion benchmarks for the hot, network-free part of a dispatch:
//! name classification, request body shaping and response parsing.

use std::hint::black_box;

use ai_advisor::{
    CatalogIndex, Turn,
    providers::{AdapterRegistry, ProviderAdapter, classify},
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

const CATALOG: &str = r#"
[[providers]]
name = "openai"
url = "https://api.openai.com/v1/chat/completions"
key = "sk-bench"
[[providers.models]]
name = "gpt-4o"

[[providers]]
name = "anthropic"
url = "https://api.anthropic.com/v1/messages"
key = "sk-ant-bench"
[[providers.models]]
name = "claude-3-5-sonnet-20241022"
max_tokens = 8192

[[providers]]
name = "google"
url = "https://generativelanguage.googleapis.com/v1beta/models/"
key = "AIza-bench"
[[providers.models]]
name = "gemini-1.5-pro"
"#;

fn history(turns: usize) -> Vec<Turn> {
    (0..turns)
        .map(|i| {
            if i % 2 == 0 {
                Turn::user(format!("Question number {} about ownership and borrowing", i))
            } else {
                Turn::assistant(format!("Answer number {} with a reasonably long explanation", i))
            }
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let names = [
        "claude-3-5-sonnet-20241022",
        "gemini-1.5-pro-latest",
        "gpt-4o-mini",
        "o3-mini",
        "deepseek-reasoner",
        "llama-3-70b-instruct",
    ];

    c.bench_function("classify_model_names", |b| {
        b.iter(|| {
            for name in names {
                black_box(classify(black_box(name)));
            }
        })
    });
}

fn bench_request_bodies(c: &mut Criterion) {
    let catalog = CatalogIndex::from_toml_str(CATALOG).expect("bench catalog");
    let registry = AdapterRegistry::new();

    let mut group = c.benchmark_group("request_body");
    for turns in [2usize, 20, 200] {
        let history = history(turns);
        group.throughput(Throughput::Elements(turns as u64));

        for model_name in ["gpt-4o", "claude-3-5-sonnet-20241022", "gemini-1.5-pro"] {
            let (_, model) = catalog.resolve(model_name).expect("model in catalog");
            let adapter = registry.adapter_for(model_name).expect("adapter");

            group.bench_with_input(BenchmarkId::new(model_name, turns), &history, |b, history| {
                b.iter(|| {
                    let body = adapter.build_request_body(model, history);
                    black_box(serde_json::to_vec(&body).expect("serializable"))
                })
            });
        }
    }
    group.finish();
}

fn bench_parse_response(c: &mut Criterion) {
    let registry = AdapterRegistry::new();
    let cases = [
        (
            "gpt-4o",
            json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{"message": {"role": "assistant", "content": "Benchmark response"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }),
        ),
        (
            "claude-3-5-sonnet-20241022",
            json!({
                "model": "claude-3-5-sonnet-20241022",
                "content": [{"type": "text", "text": "Benchmark response"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }),
        ),
        (
            "gemini-1.5-pro",
            json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Benchmark response"}]}}],
                "usageMetadata": {"totalTokenCount": 15}
            }),
        ),
    ];

    let mut group = c.benchmark_group("parse_response");
    for (model_name, body) in cases {
        let adapter = registry.adapter_for(model_name).expect("adapter");
        let raw = body.to_string();

        group.bench_function(model_name, |b| {
            b.iter(|| black_box(adapter.parse_response(200, black_box(&raw))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_request_bodies, bench_parse_response);
criterion_main!(benches);
