//! Request shapes.
//!
//! These mirror the JSON bodies the CRUD surface accepts. Field aliases keep the
//! wire names (`schema_name`, `table_name`, `base_table`, `type`) working.

use crate::error::{CompileError, CompileResult};
use crate::filter::Filters;
use crate::statement::StatementKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::slice;

/// One row of column → value pairs, in insertion order.
pub type Record = Map<String, Value>;

fn default_join_type() -> String {
    "INNER".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_salt_field() -> String {
    "email".to_string()
}

fn default_true() -> bool {
    true
}

/// One `<TYPE> JOIN table ON ...` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub table: String,
    /// INNER, LEFT, RIGHT or FULL (any case).
    #[serde(default = "default_join_type", alias = "type")]
    pub join_type: String,
    /// Trusted join condition. Must come from schema-controlled input.
    #[serde(alias = "on_clause")]
    pub on: String,
}

impl JoinSpec {
    pub fn new(join_type: impl Into<String>, table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join_type: join_type.into(),
            on: on.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// A read or join-read request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name", alias = "base_table")]
    pub table: String,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default)]
    pub select_fields: Option<Vec<String>>,
    #[serde(default)]
    pub include_fields: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_fields: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_dir: SortDir,
}

impl QuerySpec {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, dir: SortDir) -> Self {
        self.sort_by = Some(column.into());
        self.sort_dir = dir;
        self
    }

    /// Whether column resolution is required before compiling.
    pub fn needs_columns(&self) -> bool {
        self.exclude_fields.as_ref().is_some_and(|f| !f.is_empty())
    }
}

/// Password hashing options carried by create/update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOptions {
    #[serde(default)]
    pub hash_password: bool,
    #[serde(default = "default_password_field")]
    pub password_field: String,
    #[serde(default = "default_salt_field")]
    pub salt_field: String,
    /// Salt supplied out of band (update only).
    #[serde(default)]
    pub salt_value: Option<String>,
}

impl Default for CredentialOptions {
    fn default() -> Self {
        Self {
            hash_password: false,
            password_field: default_password_field(),
            salt_field: default_salt_field(),
            salt_value: None,
        }
    }
}

impl CredentialOptions {
    /// Hash `password` salted with the `email` field.
    pub fn hashed() -> Self {
        Self {
            hash_password: true,
            ..Self::default()
        }
    }

    pub fn salt_field(mut self, field: impl Into<String>) -> Self {
        self.salt_field = field.into();
        self
    }

    pub fn salt_value(mut self, salt: impl Into<String>) -> Self {
        self.salt_value = Some(salt.into());
        self
    }
}

/// A single record or a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    One(Record),
    Many(Vec<Record>),
}

impl Payload {
    pub fn records(&self) -> &[Record] {
        match self {
            Payload::One(r) => slice::from_ref(r),
            Payload::Many(rs) => rs,
        }
    }
}

impl From<Record> for Payload {
    fn from(r: Record) -> Self {
        Payload::One(r)
    }
}

impl From<Vec<Record>> for Payload {
    fn from(rs: Vec<Record>) -> Self {
        Payload::Many(rs)
    }
}

/// Insert one or more records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub table: String,
    pub data: Payload,
    #[serde(flatten)]
    pub credentials: CredentialOptions,
}

impl CreateSpec {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            data: data.into(),
            credentials: CredentialOptions::default(),
        }
    }

    pub fn credentials(mut self, credentials: CredentialOptions) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Update rows matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub table: String,
    #[serde(default)]
    pub filters: Filters,
    pub data: Record,
    #[serde(flatten)]
    pub credentials: CredentialOptions,
}

impl UpdateSpec {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, data: Record) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            filters: Filters::new(),
            data,
            credentials: CredentialOptions::default(),
        }
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn credentials(mut self, credentials: CredentialOptions) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Delete rows matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub table: String,
    #[serde(default)]
    pub filters: Filters,
}

impl DeleteSpec {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            filters: Filters::new(),
        }
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

/// A caller-written SQL template with `?` or `$n` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default = "default_true")]
    pub read_only: bool,
}

impl RawSpec {
    pub fn new(schema: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            query: query.into(),
            params: Vec::new(),
            read_only: true,
        }
    }

    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Check a plaintext password against the stored salted digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPasswordSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub table: String,
    pub identifier_field: String,
    pub identifier_value: String,
    pub password: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
    /// Defaults to `identifier_field`.
    #[serde(default)]
    pub salt_field: Option<String>,
}

impl VerifyPasswordSpec {
    pub fn salt_field(&self) -> &str {
        self.salt_field.as_deref().unwrap_or(&self.identifier_field)
    }
}

/// Operation applied to every record of a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Create,
    Update,
    Delete,
}

/// Several mutations of one kind, run in one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSpec {
    #[serde(alias = "schema_name")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub table: String,
    pub operation: BulkOperation,
    pub records: Vec<Record>,
    #[serde(flatten)]
    pub credentials: CredentialOptions,
}

/// One step of an expanded bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkStep {
    Create(CreateSpec),
    Update(UpdateSpec),
    Delete(DeleteSpec),
}

impl BulkSpec {
    /// Split the request into single mutations.
    ///
    /// Creates become one batch insert. Update records must carry `_filter` and
    /// `_data` objects; delete records are filter objects.
    pub fn steps(&self) -> CompileResult<Vec<BulkStep>> {
        match self.operation {
            BulkOperation::Create => Ok(vec![BulkStep::Create(CreateSpec {
                schema: self.schema.clone(),
                table: self.table.clone(),
                data: Payload::Many(self.records.clone()),
                credentials: self.credentials.clone(),
            })]),
            BulkOperation::Update => self
                .records
                .iter()
                .enumerate()
                .map(|(index, record)| {
                    let filters = bulk_object(index, record, "_filter")?;
                    let data = bulk_object(index, record, "_data")?;
                    Ok(BulkStep::Update(UpdateSpec {
                        schema: self.schema.clone(),
                        table: self.table.clone(),
                        filters,
                        data,
                        credentials: self.credentials.clone(),
                    }))
                })
                .collect(),
            BulkOperation::Delete => Ok(self
                .records
                .iter()
                .map(|filters| {
                    BulkStep::Delete(DeleteSpec {
                        schema: self.schema.clone(),
                        table: self.table.clone(),
                        filters: filters.clone(),
                    })
                })
                .collect()),
        }
    }
}

fn bulk_object(index: usize, record: &Record, key: &str) -> CompileResult<Map<String, Value>> {
    match record.get(key) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(CompileError::InvalidBulkRecord {
            index,
            message: format!("'{key}' must be an object"),
        }),
        None => Err(CompileError::InvalidBulkRecord {
            index,
            message: format!("missing '{key}'"),
        }),
    }
}

/// Any request the service can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Read(QuerySpec),
    JoinRead(QuerySpec),
    Create(CreateSpec),
    Update(UpdateSpec),
    Delete(DeleteSpec),
    Raw(RawSpec),
    VerifyPassword(VerifyPasswordSpec),
    Bulk(BulkSpec),
}

impl Request {
    /// Statement kind for single-statement requests.
    pub fn kind(&self) -> Option<StatementKind> {
        match self {
            Request::Read(_) => Some(StatementKind::Read),
            Request::JoinRead(_) => Some(StatementKind::JoinRead),
            Request::Create(_) => Some(StatementKind::Create),
            Request::Update(_) => Some(StatementKind::Update),
            Request::Delete(_) => Some(StatementKind::Delete),
            Request::Raw(_) => Some(StatementKind::Raw),
            Request::VerifyPassword(_) | Request::Bulk(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_spec_accepts_wire_names() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "schema_name": "public",
            "base_table": "users",
            "joins": [{"type": "left", "table": "orders", "on_clause": "users.id = orders.user_id"}],
            "sort_dir": "desc",
            "limit": 10
        }))
        .unwrap();

        assert_eq!(spec.schema, "public");
        assert_eq!(spec.table, "users");
        assert_eq!(spec.joins[0].join_type, "left");
        assert_eq!(spec.joins[0].on, "users.id = orders.user_id");
        assert_eq!(spec.sort_dir, SortDir::Desc);
        assert_eq!(spec.limit, Some(10));
        assert!(spec.filters.is_empty());
    }

    #[test]
    fn join_type_defaults_to_inner() {
        let join: JoinSpec =
            serde_json::from_value(json!({"table": "a", "on": "a.id = b.a_id"})).unwrap();
        assert_eq!(join.join_type, "INNER");
    }

    #[test]
    fn filters_keep_insertion_order() {
        let spec: QuerySpec = serde_json::from_str(
            r#"{"schema": "s", "table": "t", "filters": {"z": 1, "a": 2, "m": 3}}"#,
        )
        .unwrap();
        let keys: Vec<&str> = spec.filters.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn create_payload_single_or_batch() {
        let one: CreateSpec = serde_json::from_value(json!({
            "schema_name": "public", "table_name": "users",
            "data": {"name": "Jane"}, "hash_password": true
        }))
        .unwrap();
        assert_eq!(one.data.records().len(), 1);
        assert!(one.credentials.hash_password);
        assert_eq!(one.credentials.salt_field, "email");
        assert_eq!(one.credentials.password_field, "password");

        let many: CreateSpec = serde_json::from_value(json!({
            "schema": "public", "table": "users",
            "data": [{"name": "A"}, {"name": "B"}]
        }))
        .unwrap();
        assert_eq!(many.data.records().len(), 2);
        assert!(!many.credentials.hash_password);
    }

    #[test]
    fn raw_defaults_to_read_only() {
        let raw: RawSpec =
            serde_json::from_value(json!({"schema_name": "public", "query": "SELECT 1"})).unwrap();
        assert!(raw.read_only);
        assert!(raw.params.is_empty());
    }

    #[test]
    fn bulk_update_records_need_filter_and_data() {
        let bulk: BulkSpec = serde_json::from_value(json!({
            "schema_name": "public", "table_name": "users", "operation": "update",
            "records": [
                {"_filter": {"id": 1}, "_data": {"name": "A"}},
                {"_filter": {"id": 2}}
            ]
        }))
        .unwrap();
        let err = bulk.steps().unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidBulkRecord {
                index: 1,
                message: "missing '_data'".into()
            }
        );
    }

    #[test]
    fn bulk_create_is_one_batch() {
        let bulk: BulkSpec = serde_json::from_value(json!({
            "schema": "public", "table": "users", "operation": "create",
            "records": [{"name": "A"}, {"name": "B"}]
        }))
        .unwrap();
        let steps = bulk.steps().unwrap();
        assert_eq!(steps.len(), 1);
        let BulkStep::Create(create) = &steps[0] else {
            panic!("expected create step");
        };
        assert_eq!(create.data.records().len(), 2);
    }

    #[test]
    fn request_is_tagged_by_op() {
        let req: Request = serde_json::from_value(json!({
            "op": "delete", "schema": "public", "table": "users", "filters": {"id": 3}
        }))
        .unwrap();
        assert_eq!(req.kind(), Some(StatementKind::Delete));

        let req: Request = serde_json::from_value(json!({
            "op": "verify_password", "schema": "public", "table": "users",
            "identifier_field": "email", "identifier_value": "a@x.com", "password": "pw"
        }))
        .unwrap();
        let Request::VerifyPassword(spec) = req else {
            panic!("expected verify_password");
        };
        assert_eq!(spec.salt_field(), "email");
    }
}
