use criterion::{criterion_group, criterion_main, Criterion};
use docsearch::tokenizer::tokenize;
use docsearch::{build_index, QueryEngine, SourceDocument, Tokenizer};
use std::sync::Arc;

const PAGE: &str = "Authentication. Every request to the API needs an access token. \
    Tokens expire after one hour; call get_access_token() to fetch a fresh one. \
    Running behind a corporate proxy? Set HTTPS_PROXY before installing the client.";

fn bench_tokenize(c: &mut Criterion) {
    let text = PAGE.repeat(50);
    c.bench_function("tokenize_page", |b| b.iter(|| tokenize(&text)));
}

fn bench_search(c: &mut Criterion) {
    let docs: Vec<SourceDocument> = (0..500)
        .map(|i| SourceDocument::new(&format!("page{i}"), &format!("page{i}.rst"), &format!("Page {i} tokens"), PAGE))
        .collect();
    let index = build_index(&docs, Tokenizer::default()).expect("unique names");
    let engine = QueryEngine::new(Arc::new(index), Tokenizer::default());
    c.bench_function("search_500_docs", |b| b.iter(|| engine.search("access token proxy")));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
