use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use csload_core::config::{Dialect, LoadConfig};
use csload_core::schema::{DataType, Field, Schema};
use csload_core::sink::Catalog;
use csload_exec::IngestionPipeline;
use csload_io::sinks::MemoryCatalog;
use csload_io::RecordSplitter;
use csload_planner::MappingResolver;

fn make_input(rows: usize) -> Vec<u8> {
    let mut out = String::with_capacity(rows * 48);
    for i in 0..rows {
        out.push_str(&format!(
            "{},\"name, {}\",{}.5,\"say \"\"{}\"\"\"\n",
            i,
            i,
            i % 1000,
            i % 10
        ));
    }
    out.into_bytes()
}

fn bench_tokenizer(c: &mut Criterion) {
    let input = make_input(10_000);
    let mut group = c.benchmark_group("tokenizer");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("split_all", |b| {
        b.iter(|| RecordSplitter::split_all(Dialect::default(), &input).len())
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let input = make_input(10_000);
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
        Field::new("quote", DataType::Utf8, true),
    ]);
    let resolved = MappingResolver::new(&schema, 4)
        .implicit()
        .expect("mapping");
    let config = LoadConfig::default();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.sample_size(20);
    group.bench_function("memory_sink", |b| {
        b.iter(|| {
            let catalog = MemoryCatalog::new();
            catalog.create_table("db", "t", schema.clone());
            let sink = catalog.begin_bulk_load("db", "t").expect("begin");
            IngestionPipeline::new(&config, &schema, &resolved.mapping)
                .run(Cursor::new(&input[..]), sink)
                .expect("load")
        })
    });
    group.finish();
}

criterion_group!(loads, bench_tokenizer, bench_pipeline);
criterion_main!(loads);
