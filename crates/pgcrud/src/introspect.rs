//! Table and column listing through `information_schema`.
//!
//! `information_schema` columns are domains (`sql_identifier`, `cardinal_number`,
//! ...), so every projected column is cast to a base type first.

use crate::client::GenericClient;
use crate::error::CrudResult;
use crate::row::{FromRow, RowExt};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

const LIST_TABLES_SQL: &str = r#"
SELECT
  table_name::text AS table_name,
  table_type::text AS table_type
FROM information_schema.tables
WHERE table_schema::text = $1
ORDER BY table_name
"#;

const TABLE_COLUMNS_SQL: &str = r#"
SELECT
  column_name::text AS column_name,
  data_type::text AS data_type,
  character_maximum_length::int4 AS character_maximum_length,
  (is_nullable = 'YES') AS is_nullable,
  column_default::text AS column_default,
  ordinal_position::int4 AS ordinal_position
FROM information_schema.columns
WHERE table_schema::text = $1 AND table_name::text = $2
ORDER BY ordinal_position
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Table,
    View,
    ForeignTable,
    Temporary,
    Other,
}

impl RelationKind {
    fn from_table_type(table_type: &str) -> Self {
        match table_type {
            "BASE TABLE" => Self::Table,
            "VIEW" => Self::View,
            "FOREIGN" | "FOREIGN TABLE" => Self::ForeignTable,
            "LOCAL TEMPORARY" => Self::Temporary,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    #[serde(rename = "table_name")]
    pub name: String,
    pub table_type: String,
    pub kind: RelationKind,
}

impl FromRow for TableInfo {
    fn from_row(row: &Row) -> CrudResult<Self> {
        let table_type: String = row.try_get_column("table_type")?;
        Ok(Self {
            name: row.try_get_column("table_name")?,
            kind: RelationKind::from_table_type(&table_type),
            table_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "column_name")]
    pub name: String,
    pub data_type: String,
    #[serde(rename = "character_maximum_length")]
    pub max_length: Option<i32>,
    #[serde(rename = "is_nullable")]
    pub nullable: bool,
    #[serde(rename = "column_default")]
    pub default_expr: Option<String>,
    pub ordinal: i32,
}

impl FromRow for ColumnInfo {
    fn from_row(row: &Row) -> CrudResult<Self> {
        Ok(Self {
            name: row.try_get_column("column_name")?,
            data_type: row.try_get_column("data_type")?,
            max_length: row.try_get_column("character_maximum_length")?,
            nullable: row.try_get_column("is_nullable")?,
            default_expr: row.try_get_column("column_default")?,
            ordinal: row.try_get_column("ordinal_position")?,
        })
    }
}

/// Tables and views in `schema`, ordered by name.
pub async fn list_tables<C: GenericClient>(client: &C, schema: &str) -> CrudResult<Vec<TableInfo>> {
    let rows = client.query(LIST_TABLES_SQL, &[&schema]).await?;
    rows.iter().map(TableInfo::from_row).collect()
}

/// Columns of `schema.table` in ordinal order.
///
/// An unknown table yields an empty list.
pub async fn table_columns<C: GenericClient>(
    client: &C,
    schema: &str,
    table: &str,
) -> CrudResult<Vec<ColumnInfo>> {
    let rows = client.query(TABLE_COLUMNS_SQL, &[&schema, &table]).await?;
    rows.iter().map(ColumnInfo::from_row).collect()
}

/// Column names of `schema.table`, as needed to resolve `exclude_fields`.
pub async fn column_names<C: GenericClient>(
    client: &C,
    schema: &str,
    table: &str,
) -> CrudResult<Vec<String>> {
    Ok(table_columns(client, schema, table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect())
}
