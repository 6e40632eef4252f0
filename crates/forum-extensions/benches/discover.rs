use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use forum_extensions::{ExtensionRegistry, ManifestStore};
use forum_test_utils::TestExtensions;

fn bench_discover(c: &mut Criterion) {
    let env = TestExtensions::new();
    for i in 0..200 {
        if i % 10 == 0 {
            env.write_theme(&format!("theme-{i}"), i == 0);
        } else {
            env.write_plugin(&format!("plugin-{i}"), i % 3 == 0);
        }
    }
    let registry = ExtensionRegistry::new(Arc::new(ManifestStore::new(env.root())));

    c.bench_function("discover_200", |b| {
        b.iter(|| registry.discover().unwrap());
    });
    c.bench_function("entries_200", |b| {
        b.iter(|| registry.entries().unwrap());
    });
}

criterion_group!(benches, bench_discover);
criterion_main!(benches);
