use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pourover::detect_build_system;
use pourover::verify::sha256_file;
use std::fs;
use std::path::Path;

fn bench_sha256_file(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("sha256_file");

    for size in [4 * 1024, 1024 * 1024, 16 * 1024 * 1024] {
        let path = dir.path().join(format!("blob-{}", size));
        fs::write(&path, vec![0xa5u8; size]).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &path, |b, path| {
            b.iter(|| sha256_file(black_box(path)).unwrap())
        });
    }

    group.finish();
}

fn bench_detect_build_system(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_build_system");
    let prefix = Path::new("/opt/pour/Cellar/bench/1.0");

    // Best case matches the first entry, worst case falls through to the last
    let cases: [(&str, &[&str]); 3] = [
        ("autotools-generate", &["configure.ac", "Makefile.am"]),
        ("go-modules", &["go.mod"]),
        ("makefile", &["Makefile"]),
    ];

    for (label, markers) in cases {
        let dir = tempfile::tempdir().unwrap();
        for marker in markers {
            fs::write(dir.path().join(marker), "").unwrap();
        }
        let path = dir.path().to_path_buf();

        group.bench_with_input(BenchmarkId::from_parameter(label), &path, |b, path| {
            b.iter(|| detect_build_system(black_box(path), prefix).unwrap())
        });
    }

    group.finish();
}

fn bench_detect_no_match(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README"), "").unwrap();

    c.bench_function("detect_build_system no match", |b| {
        b.iter(|| detect_build_system(black_box(dir.path()), Path::new("/p")).is_err())
    });
}

criterion_group!(
    benches,
    bench_sha256_file,
    bench_detect_build_system,
    bench_detect_no_match
);
criterion_main!(benches);
