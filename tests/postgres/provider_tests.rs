//! `PostgreSQL` provider behaviour against a migrated database.

use backplane::provider::adapters::postgres::PostgresProvider;
use backplane::provider::domain::{
    CollectionName, Credentials, Filter, FunctionName, ObjectPath, ProviderName, Record, RecordKey,
};
use backplane::provider::ports::{PermanentKind, ProviderAdapter};
use diesel::connection::SimpleConnection;
use rstest::{fixture, rstest};
use serde_json::json;

use crate::postgres::helpers::{BoxError, TestDatabase, test_database};

struct ProviderContext {
    provider: PostgresProvider,
    db: TestDatabase,
}

#[fixture]
fn context(test_database: Result<TestDatabase, BoxError>) -> Result<ProviderContext, BoxError> {
    let db = test_database?;
    let provider = PostgresProvider::new(
        ProviderName::new("primary_pg").expect("valid name"),
        db.pool.clone(),
    );
    Ok(ProviderContext { provider, db })
}

fn users() -> CollectionName {
    CollectionName::new("users").expect("valid collection")
}

fn record(key: &str, payload: serde_json::Value) -> Record {
    Record::new(RecordKey::new(key).expect("valid key"), payload).expect("valid record")
}

fn keys(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|stored| stored.key().as_str().to_owned())
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scan_pages_follow_byte_order(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let inserted = ["b", "a-2", "B", "a", "a-10", "_z", "Z"];
    for key in inserted {
        ctx.provider
            .create(&users(), record(key, json!({ "key": key })))
            .await?;
    }

    let mut seen = Vec::new();
    let mut after = None;
    loop {
        let page = ctx.provider.scan(&users(), after.clone(), 3).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.key().clone());
        seen.extend(keys(&page));
    }

    let mut expected: Vec<String> = inserted.iter().map(|key| (*key).to_owned()).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
    assert_eq!(ctx.provider.count(&users()).await?, 7);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn filters_match_every_field_and_respect_the_limit(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let rows = [
        ("u1", json!({ "role": "admin", "team": "core" })),
        ("u2", json!({ "role": "admin", "team": "edge" })),
        ("u3", json!({ "role": "viewer", "team": "core" })),
        ("u4", json!({ "role": "admin", "team": "core", "active": false })),
    ];
    for (key, payload) in rows {
        ctx.provider.create(&users(), record(key, payload)).await?;
    }

    let core_admins = ctx
        .provider
        .query(
            &users(),
            &Filter::new().where_eq("role", "admin").where_eq("team", "core"),
        )
        .await?;
    assert_eq!(keys(&core_admins), vec!["u1", "u4"]);

    let first_admin = ctx
        .provider
        .query(&users(), &Filter::new().where_eq("role", "admin").with_limit(1))
        .await?;
    assert_eq!(keys(&first_admin), vec!["u1"]);

    let everyone = ctx.provider.query(&users(), &Filter::new()).await?;
    assert_eq!(everyone.len(), 4);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn writes_report_conflicts_and_missing_records(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let ada = record("ada", json!({ "name": "Ada" }));
    ctx.provider.create(&users(), ada.clone()).await?;

    let duplicate = ctx
        .provider
        .create(&users(), ada.clone())
        .await
        .expect_err("duplicate key must be rejected");
    assert_eq!(duplicate.permanent_kind(), Some(PermanentKind::Conflict));

    let missing = ctx
        .provider
        .update(&users(), record("grace", json!({ "name": "Grace" })))
        .await
        .expect_err("update of an absent record must fail");
    assert_eq!(missing.permanent_kind(), Some(PermanentKind::NotFound));

    let renamed = ada.clone().with_field("name", json!("Countess"));
    ctx.provider.upsert(&users(), renamed.clone()).await?;
    let stored = ctx.provider.read(&users(), ada.key()).await?;
    assert_eq!(stored, Some(renamed));

    ctx.provider.delete(&users(), ada.key()).await?;
    assert_eq!(ctx.provider.read(&users(), ada.key()).await?, None);
    let gone = ctx
        .provider
        .delete(&users(), ada.key())
        .await
        .expect_err("second delete must fail");
    assert_eq!(gone.permanent_kind(), Some(PermanentKind::NotFound));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn collections_are_listed_once_in_name_order(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let orders = CollectionName::new("orders").expect("valid collection");
    ctx.provider
        .create(&users(), record("u1", json!({})))
        .await?;
    ctx.provider
        .create(&users(), record("u2", json!({})))
        .await?;
    ctx.provider
        .create(&orders, record("o1", json!({})))
        .await?;

    assert_eq!(
        ctx.provider.list_collections().await?,
        vec![orders, users()]
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn objects_are_overwritten_listed_and_deleted(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let path = |value: &str| ObjectPath::new(value).expect("valid path");
    for name in ["docs/b.txt", "docs/a.txt", "avatars/1.png"] {
        ctx.provider
            .put_object(&path(name), name.as_bytes().to_vec())
            .await?;
    }
    ctx.provider
        .put_object(&path("docs/a.txt"), b"revised".to_vec())
        .await?;

    assert_eq!(
        ctx.provider.get_object(&path("docs/a.txt")).await?,
        Some(b"revised".to_vec())
    );

    let first_page = ctx.provider.list_objects(None, 2).await?;
    assert_eq!(first_page, vec![path("avatars/1.png"), path("docs/a.txt")]);
    let second_page = ctx
        .provider
        .list_objects(first_page.last().cloned(), 2)
        .await?;
    assert_eq!(second_page, vec![path("docs/b.txt")]);

    ctx.provider.delete_object(&path("docs/b.txt")).await?;
    assert_eq!(ctx.provider.get_object(&path("docs/b.txt")).await?, None);
    let missing = ctx
        .provider
        .delete_object(&path("docs/b.txt"))
        .await
        .expect_err("deleting an absent object must fail");
    assert_eq!(missing.permanent_kind(), Some(PermanentKind::NotFound));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn functions_run_as_sql_and_unknown_ones_are_not_found(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let mut connection = ctx.db.pool.get()?;
    connection.batch_execute(
        "CREATE FUNCTION greet(payload jsonb) RETURNS jsonb LANGUAGE sql AS \
         $$ SELECT jsonb_build_object('greeting', 'hello ' || (payload->>'name')) $$;",
    )?;
    drop(connection);

    let greeting = ctx
        .provider
        .invoke(
            &FunctionName::new("greet").expect("valid function"),
            json!({ "name": "Ada" }),
        )
        .await?;
    assert_eq!(greeting, json!({ "greeting": "hello Ada" }));

    let missing = ctx
        .provider
        .invoke(
            &FunctionName::new("resize").expect("valid function"),
            json!({}),
        )
        .await
        .expect_err("unknown function must fail");
    assert_eq!(missing.permanent_kind(), Some(PermanentKind::NotFound));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn health_check_succeeds_and_auth_is_unsupported(
    context: Result<ProviderContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    ctx.provider.probe().await?;

    let denied = ctx
        .provider
        .authenticate(&Credentials::new("ada@example.com", "secret"))
        .await
        .expect_err("postgres offers no authentication");
    assert_eq!(denied.permanent_kind(), Some(PermanentKind::Unsupported));
    Ok(())
}
