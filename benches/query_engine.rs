use criterion::{black_box, criterion_group, criterion_main, Criterion};
use response_governor::tabular::query::{apply, QueryRequest};
use response_governor::tabular::{flatten, FlattenOptions};
use serde_json::{json, Value};

fn source(rows: usize) -> Value {
    let items: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "Id": format!("id-{}", i),
                "Active": i % 3 != 0,
                "Stars": (i % 5) as i64 + 1,
                "Detail": {"en": {"Title": format!("Accommodation {}", i)}},
                "Tags": ["spa", "pool"]
            })
        })
        .collect();
    json!({"TotalResults": rows, "Items": items})
}

fn bench_query_engine(c: &mut Criterion) {
    let data = source(10_000);
    let options = FlattenOptions {
        fields: Some(vec![
            "Id".to_string(),
            "Active".to_string(),
            "Stars".to_string(),
            "Detail.en.Title".to_string(),
        ]),
        explode: false,
    };

    c.bench_function("flatten_10k", |b| {
        b.iter(|| flatten(black_box(&data), &options))
    });

    let dataset = match flatten(&data, &options) {
        Ok(flattened) => flattened.dataset,
        Err(err) => panic!("flatten failed: {}", err),
    };

    let filter = QueryRequest::Filter {
        condition: "Active == True and Stars >= 3".to_string(),
    };
    c.bench_function("filter_10k", |b| {
        b.iter(|| apply(black_box(&dataset), &filter))
    });

    let sort = QueryRequest::Sort {
        by: "Stars".to_string(),
        ascending: false,
    };
    c.bench_function("sort_10k", |b| b.iter(|| apply(black_box(&dataset), &sort)));
}

criterion_group!(benches, bench_query_engine);
criterion_main!(benches);
