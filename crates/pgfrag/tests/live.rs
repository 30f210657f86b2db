//! Round trips against a real server. Skipped unless `DATABASE_URL` is set.

use pgfrag::{DirectExecutor, Endpoint, FragError, FragResult, SqlFragment, bindings, run_batch};

async fn try_connect(test: &str) -> FragResult<Option<Endpoint>> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            return Ok(None);
        }
    };
    let executor = DirectExecutor::connect(&database_url).await?;
    Ok(Some(Endpoint::new("live", executor)))
}

#[tokio::test]
async fn typed_values_round_trip() -> FragResult<()> {
    let Some(endpoint) = try_connect("typed_values_round_trip").await? else {
        return Ok(());
    };

    let row = endpoint
        .sql(
            "SELECT :n/*BIGINT*/ AS n, :s/*TEXT*/ AS s, :missing/*INTEGER*/ AS missing",
            &bindings! { "n" => 42_i64, "s" => "hello", "missing" => Option::<i32>::None },
        )?
        .optional()
        .await?
        .expect("one row");

    assert_eq!(row.try_get::<i64>("n")?, 42);
    assert_eq!(row.try_get::<String>("s")?, "hello");
    assert_eq!(row.try_get::<Option<i32>>("missing")?, None);
    Ok(())
}

#[tokio::test]
async fn list_expansion_filters_rows() -> FragResult<()> {
    let Some(endpoint) = try_connect("list_expansion_filters_rows").await? else {
        return Ok(());
    };

    let ids = endpoint
        .records(SqlFragment::text(
            "SELECT x FROM unnest(ARRAY[1, 2, 3, 4]::int8[]) AS x WHERE ",
        ))
        .concat(SqlFragment::new(
            "x IN (:ids)",
            &bindings! { "ids" => vec![2_i64, 4] },
        )?)
        .list_map(|r| r.try_get::<i64>("x"))
        .await?;
    assert_eq!(ids, vec![2, 4]);
    Ok(())
}

#[tokio::test]
async fn batch_inserts_then_reads_back() -> FragResult<()> {
    let Some(endpoint) = try_connect("batch_inserts_then_reads_back").await? else {
        return Ok(());
    };

    endpoint
        .records(SqlFragment::text(
            "CREATE TEMP TABLE pgfrag_tags (id BIGINT PRIMARY KEY, name TEXT NOT NULL)",
        ))
        .execute()
        .await?;

    run_batch(async {
        for (id, name) in [(1_i64, "a"), (2, "b"), (3, "c")] {
            endpoint
                .sql(
                    "INSERT INTO pgfrag_tags (id, name) VALUES (:id, :name)",
                    &bindings! { "id" => id, "name" => name },
                )?
                .execute()
                .await?;
        }
        Ok::<_, FragError>(())
    })
    .await?;

    let names = endpoint
        .sql("SELECT name FROM pgfrag_tags ORDER BY id", &bindings! {})?
        .list_map(|r| r.try_get::<String>("name"))
        .await?;
    assert_eq!(names, vec!["a", "b", "c"]);
    Ok(())
}

#[cfg(feature = "pool")]
#[tokio::test]
async fn pool_executor_streams_rows() -> FragResult<()> {
    use pgfrag::PoolExecutor;

    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set; skipping pool_executor_streams_rows");
        return Ok(());
    };
    let endpoint = Endpoint::new("pooled", PoolExecutor::connect(&database_url)?);

    let mut stream = endpoint
        .records(SqlFragment::text("SELECT generate_series(1, 5)::int8 AS n"))
        .stream_map(|r| r.try_get::<i64>("n"))
        .await?;
    let mut seen = Vec::new();
    while let Some(n) = stream.next().await {
        seen.push(n?);
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert!(stream.is_closed());
    Ok(())
}
