use pgcrud::{
    CreateSpec, CredentialOptions, CrudConfig, CrudError, CrudResult, CrudService, DatabaseConfig,
    DeleteSpec, QuerySpec, RawSpec, UpdateSpec, VerifyPasswordSpec,
};
use serde_json::{Map, Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn service_or_skip(test: &str) -> Option<CrudService> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            return None;
        }
    };
    let config = CrudConfig::new().database(DatabaseConfig::from_url(database_url));
    Some(CrudService::from_config(config).expect("pool config"))
}

fn unique_schema(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("{prefix}_{}_{}", std::process::id(), nanos)
}

async fn setup(svc: &CrudService, schema: &str) -> CrudResult<()> {
    let client = svc.pool().get().await?;
    client
        .batch_execute(&format!(
            "CREATE SCHEMA {schema};
             CREATE TABLE {schema}.users (
                 id serial PRIMARY KEY,
                 name text NOT NULL,
                 age int4,
                 email text,
                 password text
             );"
        ))
        .await
        .map_err(CrudError::from_db_error)
}

async fn teardown(svc: &CrudService, schema: &str) -> CrudResult<()> {
    let client = svc.pool().get().await?;
    client
        .batch_execute(&format!("DROP SCHEMA {schema} CASCADE"))
        .await
        .map_err(CrudError::from_db_error)
}

#[tokio::test]
async fn create_then_read_returns_created_row() -> CrudResult<()> {
    let Some(svc) = service_or_skip("create_then_read_returns_created_row") else {
        return Ok(());
    };
    let schema = unique_schema("pgcrud_rt");
    setup(&svc, &schema).await?;

    let created = svc
        .create(&CreateSpec::new(
            schema.as_str(),
            "users",
            object(json!({"name": "Jane", "age": 28})),
        ))
        .await?;
    assert_eq!(created["count"], json!(1));

    let read = svc
        .read(&QuerySpec::new(schema.as_str(), "users").filters(object(json!({"name": "Jane"}))))
        .await?;
    assert_eq!(read["count"], json!(1));
    assert_eq!(read["data"][0]["age"], json!(28));

    let empty = svc
        .read(&QuerySpec::new(schema.as_str(), "users").filters(object(json!({"name": []}))))
        .await?;
    assert_eq!(empty["count"], json!(0));

    let excluded = svc
        .read(&QuerySpec {
            exclude_fields: Some(vec!["password".to_string(), "email".to_string()]),
            ..QuerySpec::new(schema.as_str(), "users")
        })
        .await?;
    let row = excluded["data"][0].as_object().expect("row object");
    assert!(row.contains_key("name"));
    assert!(!row.contains_key("password"));

    teardown(&svc, &schema).await
}

#[tokio::test]
async fn password_update_and_verify() -> CrudResult<()> {
    let Some(svc) = service_or_skip("password_update_and_verify") else {
        return Ok(());
    };
    let schema = unique_schema("pgcrud_pw");
    setup(&svc, &schema).await?;

    svc.create(
        &CreateSpec::new(
            schema.as_str(),
            "users",
            object(json!({"name": "Ann", "email": "a@x.com", "password": "first"})),
        )
        .credentials(CredentialOptions::hashed()),
    )
    .await?;

    // The salt is looked up from the matched row.
    let updated = svc
        .update(
            &UpdateSpec::new(schema.as_str(), "users", object(json!({"password": "second"})))
                .filters(object(json!({"name": "Ann"})))
                .credentials(CredentialOptions::hashed()),
        )
        .await?;
    assert_eq!(updated["count"], json!(1));

    let verify = |password: &str| VerifyPasswordSpec {
        schema: schema.clone(),
        table: "users".to_string(),
        identifier_field: "email".to_string(),
        identifier_value: "a@x.com".to_string(),
        password: password.to_string(),
        password_field: "password".to_string(),
        salt_field: None,
    };
    assert_eq!(
        svc.verify_password(&verify("second")).await?,
        json!({"verified": true, "found": true})
    );
    assert_eq!(
        svc.verify_password(&verify("first")).await?,
        json!({"verified": false, "found": true})
    );

    let unknown = VerifyPasswordSpec {
        identifier_value: "nobody@x.com".to_string(),
        ..verify("second")
    };
    assert_eq!(
        svc.verify_password(&unknown).await?,
        json!({"verified": false, "found": false})
    );

    teardown(&svc, &schema).await
}

#[tokio::test]
async fn raw_uses_schema_search_path_and_unfiltered_delete_is_rejected() -> CrudResult<()> {
    let Some(svc) = service_or_skip("raw_uses_schema_search_path") else {
        return Ok(());
    };
    let schema = unique_schema("pgcrud_raw");
    setup(&svc, &schema).await?;

    let inserted = svc
        .raw(
            &RawSpec::new(schema.as_str(), "INSERT INTO users (name, age) VALUES (?, ?)")
                .params(vec![json!("Bo"), json!(40)])
                .read_only(false),
        )
        .await?;
    assert_eq!(inserted, json!({"count": 1}));

    let rows = svc
        .raw(&RawSpec::new(schema.as_str(), "SELECT age FROM users WHERE name = ?").params(vec![json!("Bo")]))
        .await?;
    assert_eq!(rows["data"][0]["age"], json!(40));

    let err = svc
        .delete(&DeleteSpec::new(schema.as_str(), "users"))
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::PolicyViolation { .. }));

    let tables = svc.list_tables(&schema).await?;
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "users");

    teardown(&svc, &schema).await
}
