use ai_sorter_sidecar::redact::{redact, redact_value};
use ai_sorter_sidecar::types::{Category, Classification};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_redact(c: &mut Criterion) {
    let text = "contact alice@example.com or call 415-555-0132, card 4111-1111-1111-1111, \
        from 10.0.0.42, key sk-abcdefghijklmnopqrstuvwxyz";
    c.bench_function("redact_mixed_pii", |b| {
        b.iter(|| redact(black_box(text)))
    });

    let value = serde_json::json!({
        "message": "reach me at bob@example.com",
        "nested": {"ip": "192.168.1.1", "note": "clean text"},
        "list": ["plain", "card 4111111111111111 here"],
    });
    c.bench_function("redact_value_nested", |b| {
        b.iter(|| redact_value(black_box(&value)))
    });
}

fn bench_classification_mapping(c: &mut Criterion) {
    c.bench_function("classification_from_category", |b| {
        b.iter(|| Classification::from_category(black_box(Category::Critical)).normalized())
    });
}

criterion_group!(benches, bench_redact, bench_classification_mapping);
criterion_main!(benches);
