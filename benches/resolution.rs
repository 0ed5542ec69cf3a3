//! Resolution Benchmarks
//!
//! - Locator normalization (clean, double-encoded, scheme-less)
//! - Thumbnail memory-tier lookups
//! - Identity-cache hit through the full resolver
//!
//! Run with: `cargo bench --bench resolution`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use studynotes_resolver::cache::{ThumbnailStore, TieredThumbnailCache};
use studynotes_resolver::locator::{content_key, normalize};
use studynotes_resolver::pdf::placeholder_thumbnail;
use studynotes_resolver::{DocumentRef, Resolver, ResolverConfig};

/// Single-page PDF for the resolver benchmark
fn minimal_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>",
    ];
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", xref).as_bytes(),
    );
    out
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    let inputs = [
        ("clean", "https://storage.example.com/notes/calculus.pdf"),
        ("spaces", "https://storage.example.com/notes/week 1 summary.pdf"),
        (
            "double_encoded",
            "https://storage.example.com/notes/%25E5%25BE%25AE%25E7%25A9%258D%2520I.pdf?token=abc",
        ),
        ("no_scheme", "storage.example.com/notes/linear algebra.pdf"),
    ];

    for (name, input) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| normalize(black_box(input)))
        });
    }

    group.bench_function("content_key", |b| {
        let url = normalize("https://storage.example.com/notes/calculus.pdf").unwrap();
        b.iter(|| content_key(black_box(&url)))
    });

    group.finish();
}

fn bench_thumbnail_memory_tier(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let config = ResolverConfig::with_dirs(dir.path().join("cache"), dir.path().join("data"));

    let cache = rt.block_on(TieredThumbnailCache::open(&config)).unwrap();
    let thumbnail = placeholder_thumbnail(&config.thumbnails).unwrap();
    rt.block_on(async {
        for i in 0..100 {
            cache.put(&format!("note-{}", i), thumbnail.clone()).await;
        }
    });

    c.bench_function("thumbnail_memory_hit", |b| {
        b.iter(|| rt.block_on(cache.get(black_box("note-42"))))
    });
}

fn bench_identity_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let config = ResolverConfig::with_dirs(dir.path().join("cache"), dir.path().join("data"));

    let local = dir.path().join("notes.pdf");
    std::fs::write(&local, minimal_pdf()).unwrap();

    let resolver = Arc::new(rt.block_on(Resolver::new(config)).unwrap());
    let doc = DocumentRef::new("bench-doc", local.to_string_lossy());
    // first resolution copies the file into the identity cache
    rt.block_on(resolver.resolve_strict(&doc)).unwrap();

    let mut group = c.benchmark_group("resolve");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("identity_hit", |b| {
        b.iter(|| rt.block_on(resolver.resolve_strict(black_box(&doc))))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_thumbnail_memory_tier,
    bench_identity_hit
);
criterion_main!(benches);
