//! Sorting and chunking throughput on a catalog-sized dataset

use catalog_curator_lib::domain::{
    Dataset, SortColumn, SortOrder, TableModel, chunk_unprocessed, columns,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn catalog(rows: usize) -> Dataset {
    Dataset::with_rows(
        vec![
            columns::CODE.to_string(),
            columns::NAME.to_string(),
            "Bežná cena".to_string(),
            columns::PROCESSED_FLAG.to_string(),
        ],
        (0..rows)
            .map(|k| {
                vec![
                    format!("KOD-{:05}", (k * 7919) % rows),
                    format!("Výrobok {k}"),
                    format!("{}.{:02}", (k * 31) % 5000, k % 100),
                    if k % 3 == 0 { "TRUE".into() } else { String::new() },
                ]
            })
            .collect(),
    )
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_model_sort");
    for rows in [1_000, 10_000] {
        let data = catalog(rows);
        group.bench_with_input(BenchmarkId::new("text_column", rows), &data, |b, data| {
            let mut model = TableModel::new(data.clone(), false);
            model.check_rows((0..rows).step_by(10));
            b.iter(|| model.sort(black_box(SortColumn::Data(0)), SortOrder::Descending));
        });
        group.bench_with_input(BenchmarkId::new("numeric_column", rows), &data, |b, data| {
            let mut model = TableModel::new(data.clone(), false);
            b.iter(|| model.sort(black_box(SortColumn::Data(2)), SortOrder::Ascending));
        });
    }
    group.finish();
}

fn bench_chunk(c: &mut Criterion) {
    let data = catalog(10_000);
    c.bench_function("chunk_unprocessed_10k", |b| {
        b.iter(|| chunk_unprocessed(black_box(&data), 50));
    });
}

criterion_group!(benches, bench_sort, bench_chunk);
criterion_main!(benches);
