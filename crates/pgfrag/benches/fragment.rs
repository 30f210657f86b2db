use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgfrag::{Bindings, ParamStyle, SqlFragment, Value};

/// `col0 = :p0 AND col1 = :p1 ...` with `n` placeholders.
fn template(n: usize) -> (String, Bindings) {
    let mut sql = String::from("SELECT * FROM t WHERE ");
    let mut bindings = Bindings::new();
    for i in 0..n {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str(&format!("col{i} = :p{i}"));
        bindings.insert(format!("p{i}"), i as i64);
    }
    (sql, bindings)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment/build");

    for n in [1, 5, 10, 50, 100] {
        let input = template(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, (sql, bindings)| {
            b.iter(|| black_box(SqlFragment::new(sql, bindings).unwrap()));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment/render");

    for n in [1, 5, 10, 50, 100] {
        let (sql, bindings) = template(n);
        let fragment = SqlFragment::new(&sql, &bindings).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &fragment, |b, f| {
            b.iter(|| black_box(f.render(ParamStyle::Numbered)));
        });
    }

    group.finish();
}

fn bench_list_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment/list_expansion");

    for n in [5, 20, 100, 500] {
        let ids: Vec<i64> = (0..n).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &ids, |b, ids| {
            b.iter(|| {
                let mut bindings = Bindings::new();
                bindings.insert("ids", Value::from(ids.clone()));
                let f = SqlFragment::new("SELECT * FROM t WHERE id IN (:ids)", &bindings).unwrap();
                black_box(f.to_pg_sql());
            });
        });
    }

    group.finish();
}

fn bench_and_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment/and_all");

    for n in [2, 10, 50] {
        let parts: Vec<SqlFragment> = (0..n)
            .map(|i| {
                let mut bindings = Bindings::new();
                bindings.insert("v", i as i64);
                SqlFragment::new(&format!("col{i} = :v"), &bindings).unwrap()
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &parts, |b, parts| {
            b.iter(|| black_box(SqlFragment::and_all(parts.iter().cloned()).to_pg_sql()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_render,
    bench_list_expansion,
    bench_and_all
);
criterion_main!(benches);
