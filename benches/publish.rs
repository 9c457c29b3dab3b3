//! Performance benchmarks for microcosm-producer
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use microcosm_producer::{
    deferred, deferred_batch, MemoryCodecRegistry, MemoryTransport, MessageProducer,
    ProduceOptions, Producer, ProducerConfig, PubSubError, TopicResolver, TopicTable,
    BATCH_MEDIA_TYPE,
};

const FOO_MEDIA_TYPE: &str = "application/vnd.microcosm.pubsub._.created.foo";

fn memory_producer() -> Arc<Producer> {
    let topics = TopicTable::builder()
        .default_topic("default-topic")
        .topic(BATCH_MEDIA_TYPE, "batch-topic")
        .build();
    Arc::new(
        Producer::builder(
            Arc::new(MemoryTransport::new()),
            Arc::new(MemoryCodecRegistry::json()),
            Arc::new(topics),
        )
        .build(),
    )
}

fn bench_topic_resolution(c: &mut Criterion) {
    let config = ProducerConfig::from_vars(
        "bench",
        (0..50).map(|i| {
            (
                format!("BENCH__TOPICS__CREATED__RESOURCE_{}", i),
                format!("topic-{}", i),
            )
        }),
    )
    .unwrap();
    let table = config.topic_table().unwrap();

    c.bench_function("TopicTable resolve (explicit)", |b| {
        b.iter(|| {
            table
                .resolve("application/vnd.microcosm.pubsub._.created.resource_25")
                .unwrap()
        });
    });

    let table = TopicTable::builder().default_topic("default-topic").build();
    c.bench_function("TopicTable resolve (default)", |b| {
        b.iter(|| table.resolve(FOO_MEDIA_TYPE).unwrap());
    });
}

fn bench_produce(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let producer = memory_producer();

    c.bench_function("Producer produce", |b| {
        b.to_async(&rt).iter(|| async {
            producer
                .produce(FOO_MEDIA_TYPE, serde_json::json!({"bar": "baz"}))
                .await
                .unwrap()
        });
    });

    let opts = ProduceOptions::new()
        .with_uri("http://localhost/api/v1/foo/1")
        .with_context("request_id", "bench")
        .with_origin(microcosm_producer::origin!("bench_produce"));
    c.bench_function("Producer produce (with options)", |b| {
        b.to_async(&rt).iter(|| async {
            producer
                .produce_with_options(FOO_MEDIA_TYPE, serde_json::json!({"bar": "baz"}), &opts)
                .await
                .unwrap()
        });
    });
}

fn bench_deferred_flush(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("deferred_flush");
    for count in [10, 100] {
        group.bench_function(format!("individual {} messages", count), |b| {
            b.to_async(&rt).iter(|| async {
                let producer = memory_producer();
                deferred(&producer, |p| {
                    Box::pin(async move {
                        for i in 0..count {
                            p.produce(FOO_MEDIA_TYPE, serde_json::json!({"i": i})).await?;
                        }
                        Ok::<_, PubSubError>(())
                    })
                })
                .await
                .unwrap()
            });
        });

        group.bench_function(format!("batch {} messages", count), |b| {
            b.to_async(&rt).iter(|| async {
                let producer = memory_producer();
                deferred_batch(&producer, |p| {
                    Box::pin(async move {
                        for i in 0..count {
                            p.produce(FOO_MEDIA_TYPE, serde_json::json!({"i": i})).await?;
                        }
                        Ok::<_, PubSubError>(())
                    })
                })
                .await
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_topic_resolution,
    bench_produce,
    bench_deferred_flush,
);
criterion_main!(benches);
