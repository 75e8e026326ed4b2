use criterion::{black_box, criterion_group, criterion_main, Criterion};
use provis_version::{Version, VersionRange};

fn bench_parse(c: &mut Criterion) {
    let versions = [
        "1",
        "1.2",
        "1.2.3",
        "3.5.0.v20081202-0800-7p83FGDFHmHuj2mNpJBSKZe",
        "2020.4.20",
        "0.0.0",
    ];

    c.bench_function("parse_versions", |b| {
        b.iter(|| {
            for version in versions {
                black_box(Version::parse(black_box(version)).ok());
            }
        })
    });
}

fn bench_range_includes(c: &mut Criterion) {
    let ranges: Vec<VersionRange> = ["[1.0,2.0)", "(1.1.0,1.2.0]", "1.5", "[3.5.0.v1,3.5.0.v1]"]
        .iter()
        .filter_map(|r| VersionRange::parse(r).ok())
        .collect();
    let versions: Vec<Version> = ["1.0", "1.1.1", "1.9.9.z", "3.5.0.v1", "4"]
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();

    c.bench_function("range_includes", |b| {
        b.iter(|| {
            for range in &ranges {
                for version in &versions {
                    black_box(range.includes(black_box(version)));
                }
            }
        })
    });
}

fn bench_sort(c: &mut Criterion) {
    let mut versions: Vec<Version> = (0..200)
        .map(|i| Version::with_qualifier(i % 7, i % 13, i % 5, format!("q{}", i % 3)))
        .collect();

    c.bench_function("sort_versions", |b| {
        b.iter(|| {
            versions.sort();
            versions.reverse();
            black_box(&versions);
        })
    });
}

criterion_group!(benches, bench_parse, bench_range_includes, bench_sort);
criterion_main!(benches);
