use criterion::{black_box, criterion_group, criterion_main, Criterion};
use screenshot_service::{
    is_hostname_allowed, parse_host_whitelist, validate, validate_bearer_token, CaptureRequest,
};
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    configure_fast_group(&mut group);

    let minimal = CaptureRequest::for_url("https://example.com");
    let full = CaptureRequest {
        url: Some("https://docs.example.com/guide?page=2".to_string()),
        full_page: Some("true".to_string()),
        quality: Some("80".to_string()),
        format: Some("jpeg".to_string()),
        width: Some("1280".to_string()),
        height: Some("720".to_string()),
        wait_until: Some("networkidle0".to_string()),
        wait_for_selector: Some("#content".to_string()),
        delay_ms: Some("250".to_string()),
        color_scheme: Some("dark".to_string()),
    };
    let invalid = CaptureRequest {
        url: Some("ftp://example.com".to_string()),
        quality: Some("abc".to_string()),
        width: Some("99999".to_string()),
        ..Default::default()
    };

    group.bench_function("minimal", |b| b.iter(|| black_box(validate(black_box(&minimal)))));
    group.bench_function("all_fields", |b| b.iter(|| black_box(validate(black_box(&full)))));
    group.bench_function("invalid", |b| b.iter(|| black_box(validate(black_box(&invalid)))));

    group.finish();
}

fn benchmark_security_gates(c: &mut Criterion) {
    let mut group = c.benchmark_group("security");
    configure_fast_group(&mut group);

    let whitelist = parse_host_whitelist("example.com,example.org,cdn.example.net,docs.rs");

    group.bench_function("hostname_allowed", |b| {
        b.iter(|| {
            for host in ["a.b.example.org", "evilexample.com", "docs.rs"] {
                black_box(is_hostname_allowed(black_box(host), &whitelist));
            }
        });
    });

    group.bench_function("bearer_token", |b| {
        b.iter(|| {
            black_box(validate_bearer_token(
                black_box(Some("Bearer 0123456789abcdef0123456789abcdef")),
                "0123456789abcdef0123456789abcdef",
            ))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_validation, benchmark_security_gates);
criterion_main!(benches);
