use super::builder::SqlBuilder;
use super::{column_ident, table_ident};
use crate::error::{CompileError, CompileResult};
use crate::filter::FilterExpression;
use crate::ident::Ident;
use crate::password::{apply_credentials, has_password, salt_text};
use crate::spec::{CreateSpec, DeleteSpec, Record, UpdateSpec};
use crate::statement::{CompiledStatement, StatementKind};
use crate::value::SqlValue;

/// Compile a create request into one multi-row INSERT.
///
/// Columns are the union of all record keys in first-seen order. A record that
/// lacks one of them contributes `DEFAULT` for it.
///
/// ```text
/// INSERT INTO "s"."t" ("a", "b") VALUES ($1, $2), ($3, DEFAULT) RETURNING *
/// ```
pub fn create(spec: &CreateSpec) -> CompileResult<CompiledStatement> {
    let table = table_ident(&spec.schema, &spec.table)?;
    let records = spec.data.records();
    if records.is_empty() {
        return Err(CompileError::EmptyMutationPayload {
            field: "data".to_string(),
        });
    }

    let mut prepared = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if record.is_empty() {
            return Err(CompileError::EmptyMutationPayload {
                field: if records.len() == 1 {
                    "data".to_string()
                } else {
                    format!("data[{i}]")
                },
            });
        }
        let mut record = record.clone();
        apply_credentials(&mut record, &spec.credentials, None)?;
        prepared.push(record);
    }

    let mut names: Vec<&str> = Vec::new();
    for record in &prepared {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }
    let columns = names
        .iter()
        .map(|c| column_ident("data", c))
        .collect::<CompileResult<Vec<_>>>()?;

    let mut b = SqlBuilder::new("INSERT INTO ");
    b.push_ident(&table).push(" (");
    push_ident_list(&mut b, &columns);
    b.push(") VALUES ");

    for (row, record) in prepared.iter().enumerate() {
        if row > 0 {
            b.push(", ");
        }
        b.push("(");
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            match record.get(*name) {
                Some(v) => b.push_bind(SqlValue::from_json(v.clone())),
                None => b.push("DEFAULT"),
            };
        }
        b.push(")");
    }
    b.push(" RETURNING *");

    Ok(b.finish(StatementKind::Create))
}

/// Compile an update request.
///
/// When the request hashes a password, the salt is taken from the payload's
/// salt field, then `salt_value`, then `looked_up_salt` (the result of running
/// [`salt_lookup`]).
pub fn update(spec: &UpdateSpec, looked_up_salt: Option<&str>) -> CompileResult<CompiledStatement> {
    let table = table_ident(&spec.schema, &spec.table)?;
    if spec.data.is_empty() {
        return Err(CompileError::EmptyMutationPayload {
            field: "data".to_string(),
        });
    }
    let filter = FilterExpression::parse(&spec.filters)?;

    let mut data = spec.data.clone();
    let salt = if payload_salt(&data, spec).is_some() {
        None
    } else {
        spec.credentials.salt_value.as_deref().or(looked_up_salt)
    };
    apply_credentials(&mut data, &spec.credentials, salt)?;

    let mut b = SqlBuilder::new("UPDATE ");
    b.push_ident(&table).push(" SET ");
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        let column = column_ident("data", column)?;
        b.push_ident(&column)
            .push(" = ")
            .push_bind(SqlValue::from_json(value.clone()));
    }
    filter.write_where(&mut b);
    b.push(" RETURNING *");

    let mut stmt = b.finish(StatementKind::Update);
    stmt.affects_all_rows = filter.is_empty();
    Ok(stmt)
}

/// Statement fetching the salt for a password update, if one is needed.
///
/// Returns `None` when the request does not hash a password or the salt is
/// already known from the payload or `salt_value`.
///
/// ```text
/// SELECT "email" FROM "s"."t" WHERE ... LIMIT 1
/// ```
pub fn salt_lookup(spec: &UpdateSpec) -> CompileResult<Option<CompiledStatement>> {
    if !has_password(&spec.data, &spec.credentials)
        || payload_salt(&spec.data, spec).is_some()
        || spec.credentials.salt_value.is_some()
    {
        return Ok(None);
    }

    let table = table_ident(&spec.schema, &spec.table)?;
    let salt = column_ident("salt_field", &spec.credentials.salt_field)?;
    let filter = FilterExpression::parse(&spec.filters)?;

    let mut b = SqlBuilder::new("SELECT ");
    b.push_ident(&salt).push(" FROM ").push_ident(&table);
    filter.write_where(&mut b);
    b.push(" LIMIT 1");
    Ok(Some(b.finish(StatementKind::Read)))
}

/// Compile a delete request.
pub fn delete(spec: &DeleteSpec) -> CompileResult<CompiledStatement> {
    let table = table_ident(&spec.schema, &spec.table)?;
    let filter = FilterExpression::parse(&spec.filters)?;

    let mut b = SqlBuilder::new("DELETE FROM ");
    b.push_ident(&table);
    filter.write_where(&mut b);
    b.push(" RETURNING *");

    let mut stmt = b.finish(StatementKind::Delete);
    stmt.affects_all_rows = filter.is_empty();
    Ok(stmt)
}

fn payload_salt(data: &Record, spec: &UpdateSpec) -> Option<String> {
    data.get(&spec.credentials.salt_field).and_then(salt_text)
}

fn push_ident_list(b: &mut SqlBuilder, idents: &[Ident]) {
    for (i, ident) in idents.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_ident(ident);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::spec::CredentialOptions;
    use serde_json::{Value, json};

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn create_single() {
        let spec = CreateSpec::new("public", "users", record(json!({"name": "Jane", "age": 28})));
        let stmt = create(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "public"."users" ("name", "age") VALUES ($1, $2) RETURNING *"#
        );
        assert_eq!(stmt.params, vec![SqlValue::from("Jane"), SqlValue::Int(28)]);
        assert_eq!(stmt.kind, StatementKind::Create);
    }

    #[test]
    fn create_batch_fills_defaults() {
        let spec = CreateSpec::new(
            "public",
            "users",
            vec![
                record(json!({"name": "A", "age": 1})),
                record(json!({"name": "B", "tags": ["x"]})),
            ],
        );
        let stmt = create(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "public"."users" ("name", "age", "tags") VALUES ($1, $2, DEFAULT), ($3, DEFAULT, $4) RETURNING *"#
        );
        assert_eq!(stmt.params[3], SqlValue::Json(json!(["x"])));
    }

    #[test]
    fn create_rejects_empty_payload() {
        let spec = CreateSpec::new("public", "users", Vec::<Record>::new());
        assert_eq!(
            create(&spec).unwrap_err(),
            CompileError::EmptyMutationPayload {
                field: "data".into()
            }
        );

        let spec = CreateSpec::new("public", "users", vec![record(json!({"a": 1})), Record::new()]);
        assert_eq!(
            create(&spec).unwrap_err(),
            CompileError::EmptyMutationPayload {
                field: "data[1]".into()
            }
        );
    }

    #[test]
    fn create_rejects_bad_column() {
        let spec = CreateSpec::new("public", "users", record(json!({"na me": 1})));
        assert!(matches!(
            create(&spec).unwrap_err(),
            CompileError::InvalidIdentifier { .. }
        ));
    }

    #[test]
    fn create_hashes_password_with_record_salt() {
        let spec = CreateSpec::new(
            "public",
            "users",
            record(json!({"email": "a@x.com", "password": "secret"})),
        )
        .credentials(CredentialOptions::hashed());
        let stmt = create(&spec).unwrap();
        let digest = hash_password("secret", "a@x.com", "email").unwrap();
        assert_eq!(stmt.params[1], SqlValue::Text(digest));
    }

    #[test]
    fn update_with_filter() {
        let spec = UpdateSpec::new("public", "users", record(json!({"name": "Jo", "meta": {"k": 1}})))
            .filters(record(json!({"id": 7})));
        let stmt = update(&spec, None).unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "public"."users" SET "name" = $1, "meta" = $2 WHERE "id" = $3 RETURNING *"#
        );
        assert_eq!(stmt.params[2], SqlValue::Int(7));
        assert!(!stmt.affects_all_rows);
    }

    #[test]
    fn unfiltered_mutations_are_flagged() {
        let spec = UpdateSpec::new("public", "users", record(json!({"active": false})));
        let stmt = update(&spec, None).unwrap();
        assert_eq!(stmt.sql, r#"UPDATE "public"."users" SET "active" = $1 RETURNING *"#);
        assert!(stmt.affects_all_rows);

        let stmt = delete(&DeleteSpec::new("public", "users")).unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "public"."users" RETURNING *"#);
        assert!(stmt.is_unfiltered_mutation());
    }

    #[test]
    fn delete_with_filter() {
        let spec = DeleteSpec::new("public", "users").filters(record(json!({"id": [1, 2]})));
        let stmt = delete(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            r#"DELETE FROM "public"."users" WHERE "id" IN ($1, $2) RETURNING *"#
        );
        assert!(!stmt.affects_all_rows);
    }

    #[test]
    fn update_password_salt_sources() {
        let base = UpdateSpec::new("public", "users", record(json!({"password": "secret"})))
            .filters(record(json!({"id": 1})))
            .credentials(CredentialOptions::hashed());

        // Needs a lookup.
        let lookup = salt_lookup(&base).unwrap().unwrap();
        assert_eq!(
            lookup.sql,
            r#"SELECT "email" FROM "public"."users" WHERE "id" = $1 LIMIT 1"#
        );
        assert!(matches!(
            update(&base, None).unwrap_err(),
            CompileError::MissingSalt { .. }
        ));

        let stmt = update(&base, Some("a@x.com")).unwrap();
        let digest = hash_password("secret", "a@x.com", "email").unwrap();
        assert_eq!(stmt.params[0], SqlValue::Text(digest.clone()));

        // Explicit salt_value wins over the looked-up one.
        let explicit = base
            .clone()
            .credentials(CredentialOptions::hashed().salt_value("a@x.com"));
        assert!(salt_lookup(&explicit).unwrap().is_none());
        let stmt = update(&explicit, Some("other")).unwrap();
        assert_eq!(stmt.params[0], SqlValue::Text(digest));

        // Salt in the payload needs no lookup.
        let mut in_payload = base.clone();
        in_payload.data.insert("email".into(), json!("b@x.com"));
        assert!(salt_lookup(&in_payload).unwrap().is_none());
        let stmt = update(&in_payload, Some("ignored")).unwrap();
        assert_eq!(
            stmt.params[0],
            SqlValue::Text(hash_password("secret", "b@x.com", "email").unwrap())
        );
    }

    #[test]
    fn no_lookup_without_password() {
        let spec = UpdateSpec::new("public", "users", record(json!({"name": "x"})))
            .credentials(CredentialOptions::hashed());
        assert!(salt_lookup(&spec).unwrap().is_none());
    }
}
