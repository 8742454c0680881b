use criterion::{black_box, criterion_group, criterion_main, Criterion};
use devmaster::types::{extract_json, GenerationKind, GenerationOutput, ProviderPreference};

const QUIZ_JSON: &str = r#"{"questions":[{"q":"What does `let` declare?","options":["A block-scoped variable","A function","A class"],"answerIndex":0,"explain":"let is block scoped."},{"q":"Which keyword declares a constant?","options":["var","const"],"answerIndex":1}]}"#;

fn bench_preference_parse(c: &mut Criterion) {
    c.bench_function("preference_auto", |b| {
        b.iter(|| ProviderPreference::parse(black_box(None)))
    });

    c.bench_function("preference_explicit", |b| {
        b.iter(|| ProviderPreference::parse(black_box(Some("gemini"))))
    });

    c.bench_function("preference_unknown", |b| {
        b.iter(|| ProviderPreference::parse(black_box(Some("midjourney"))))
    });
}

fn bench_output_parsing(c: &mut Criterion) {
    let fenced = format!("Here is your quiz:\n```json\n{}\n```\nGood luck!", QUIZ_JSON);

    c.bench_function("extract_json_bare", |b| {
        b.iter(|| extract_json(black_box(QUIZ_JSON)))
    });

    c.bench_function("extract_json_fenced", |b| {
        b.iter(|| extract_json(black_box(&fenced)))
    });

    c.bench_function("parse_quiz_output", |b| {
        b.iter(|| GenerationOutput::parse_text(GenerationKind::Quiz, black_box(&fenced)))
    });
}

fn bench_export(c: &mut Criterion) {
    use devmaster::export::{docx::render_docx, pdf::render_pdf};

    let content = "Closures capture variables from the enclosing scope. ".repeat(400);

    c.bench_function("render_pdf", |b| {
        b.iter(|| render_pdf(black_box("Rust Closures"), black_box(&content)))
    });

    c.bench_function("render_docx", |b| {
        b.iter(|| render_docx(black_box("Rust Closures"), black_box(&content)))
    });
}

criterion_group!(benches, bench_preference_parse, bench_output_parsing, bench_export);
criterion_main!(benches);
