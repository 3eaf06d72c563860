//! Benchmarks for ignore resolution and scanning.
//!
//! **Benchmarks Included:**
//! - `is_excluded`: per-file eligibility checks in trees 1, 4 and 8 levels deep,
//!   each level carrying its own ignore file
//! - `scan_tree`: full scan of a few hundred files
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                       # Run all benchmarks
//! cargo bench -- is_excluded        # Ignore resolution only
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;
use tidemark::watcher::{IgnoreResolver, Scanner};
use tokio_util::sync::CancellationToken;

/// Build `depth` nested directories, each with an ignore file and a few files.
fn nested_tree(depth: usize) -> (TempDir, PathBuf, Vec<PathBuf>) {
    let tmpdir = TempDir::new().expect("failed to create temp dir");
    let root = tmpdir.path().canonicalize().expect("failed to resolve temp dir");

    let mut files = Vec::new();
    let mut dir = root.clone();
    for level in 0..depth {
        fs::create_dir_all(&dir).expect("failed to create dir");
        fs::write(
            dir.join(".gitignore"),
            format!("*.level{level}\n!keep.level{level}\ncache/\n"),
        )
        .expect("failed to write ignore file");
        for name in ["main.rs", "lib.rs", "notes.md", "keep.level0", "junk.level1"] {
            let file = dir.join(name);
            fs::write(&file, "x").expect("failed to write file");
            files.push(file);
        }
        dir = dir.join(format!("d{level}"));
    }

    (tmpdir, root, files)
}

fn resolver_for(root: &Path) -> Arc<IgnoreResolver> {
    let resolver =
        Arc::new(IgnoreResolver::new(".gitignore", Vec::new(), None).expect("failed to build"));
    resolver.add_root(root).expect("failed to add root");
    resolver
}

fn bench_is_excluded(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_excluded");

    for depth in &[1usize, 4, 8] {
        let (_tmpdir, root, files) = nested_tree(*depth);
        let resolver = resolver_for(&root);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &files, |b, files| {
            b.iter(|| {
                for file in files {
                    black_box(resolver.is_excluded(black_box(file)));
                }
            });
        });
    }

    group.finish();
}

fn bench_scan_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_tree");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    let (_tmpdir, root, _) = nested_tree(6);
    for i in 0..300 {
        fs::write(root.join(format!("file{i}.rs")), "fn f() {}").expect("failed to write file");
    }
    let scanner = Scanner::new(resolver_for(&root), 1024 * 1024);
    let cancel = CancellationToken::new();

    group.bench_function("300_files", |b| {
        b.iter(|| black_box(scanner.scan(&root, &cancel).files.len()));
    });

    group.finish();
}

criterion_group!(benches, bench_is_excluded, bench_scan_tree);
criterion_main!(benches);
