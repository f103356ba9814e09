use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use flagmap::analyzer::scan;
use flagmap::analyzer::{Analyzer, CancelFlag};
use flagmap::config::EngineConfig;
use flagmap::resolve::ConstantTable;
use flagmap::syntax::SyntaxTree;
use flagmap::syntax::java::JavaFrontend;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_forest() -> (EngineConfig, Vec<SyntaxTree>) {
    let root = fixture_path("spring_flags");
    let config = EngineConfig::load(&root.join("flagmap.yaml")).unwrap();
    let files = scan::scan_repo(&root).unwrap();
    let mut frontend = JavaFrontend::new().unwrap();
    let trees = files
        .iter()
        .map(|file| {
            let source = std::fs::read_to_string(&file.abs_path).unwrap();
            frontend.parse(&file.rel_path, &source).unwrap()
        })
        .collect();
    (config, trees)
}

fn bench_parse(c: &mut Criterion) {
    let root = fixture_path("spring_flags");
    let files = scan::scan_repo(&root).unwrap();
    let sources: Vec<(String, String)> = files
        .iter()
        .map(|file| {
            let source = std::fs::read_to_string(&file.abs_path).unwrap();
            (file.rel_path.clone(), source)
        })
        .collect();
    let mut frontend = JavaFrontend::new().unwrap();

    c.bench_function("parse_fixture_repo", |b| {
        b.iter(|| {
            for (path, source) in &sources {
                black_box(frontend.parse(path, source).unwrap());
            }
        });
    });
}

fn bench_constant_table(c: &mut Criterion) {
    let (_, trees) = load_forest();
    c.bench_function("constant_table", |b| {
        b.iter(|| black_box(ConstantTable::from_trees(&trees).unwrap()));
    });
}

fn bench_forest_threads(c: &mut Criterion) {
    let (config, trees) = load_forest();
    let mut group = c.benchmark_group("analyze_forest");
    for threads in [1usize, 2, 4] {
        let analyzer = Analyzer::new(EngineConfig {
            threads,
            ..config.clone()
        })
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| {
                let forest = analyzer
                    .analyze_forest(black_box(&trees), &CancelFlag::new())
                    .unwrap();
                black_box(forest.index.endpoints.len())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_constant_table,
    bench_forest_threads
);
criterion_main!(benches);
