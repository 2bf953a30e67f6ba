use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use openfeature_contrib::{
    providers::{InMemoryFlag, InMemoryProvider},
    CacheConfig, CachedProvider, EvaluationCache, EvaluationContext, FeatureProvider,
    ResolutionDetail,
};

fn context(i: usize) -> EvaluationContext {
    EvaluationContext::new()
        .with_targeting_key(format!("subject{i}"))
        .with_attribute("country", "US")
        .with_attribute("age", 42)
}

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("evaluation-cache");
        group.throughput(Throughput::Elements(1));

        let cache = EvaluationCache::new(CacheConfig::default());
        let ctx = context(0);
        cache.insert("flag", &ctx, &ResolutionDetail::new(true));
        group.bench_function("get-hit", |b| {
            b.iter(|| cache.get::<bool>(black_box("flag"), black_box(&ctx)))
        });

        let missing = context(1);
        group.bench_function("get-miss", |b| {
            b.iter(|| cache.get::<bool>(black_box("flag"), black_box(&missing)))
        });

        let small = EvaluationCache::new(CacheConfig::default().max_size(100));
        let contexts = (0..1000).map(context).collect::<Vec<_>>();
        let mut i = 0;
        group.bench_function("insert-with-eviction", |b| {
            b.iter(|| {
                i = (i + 1) % contexts.len();
                small.insert(black_box("flag"), &contexts[i], &ResolutionDetail::new(true))
            })
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("cached-provider");
        group.throughput(Throughput::Elements(1));

        let flags = || {
            InMemoryProvider::new([(
                "new-user-onboarding".to_owned(),
                InMemoryFlag::new("control", [("control", "control"), ("red", "red")])
                    .with_context_evaluator(|context| {
                        (context.attribute("country").and_then(|it| it.as_str()) == Some("US"))
                            .then(|| "red".to_owned())
                    }),
            )])
        };
        let ctx = context(0);

        let uncached = flags();
        group.bench_function("uncached", |b| {
            b.iter(|| {
                uncached.resolve_string_value(
                    black_box("new-user-onboarding"),
                    String::new(),
                    black_box(&ctx),
                )
            })
        });

        let cached = CachedProvider::new(flags(), CacheConfig::default().ttl(Duration::from_secs(3600)));
        group.bench_function("cached", |b| {
            b.iter(|| {
                cached.resolve_string_value(
                    black_box("new-user-onboarding"),
                    String::new(),
                    black_box(&ctx),
                )
            })
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
