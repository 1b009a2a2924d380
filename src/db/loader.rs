use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::schema::{quote_ident, TableSchema};
use crate::db::table::{SqlValue, Table};
use crate::error::{AppError, Result};

/// Outcome of one load call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub input_rows: usize,
    /// `rows_after - rows_before`; smaller than `input_rows` when keys already existed.
    pub inserted: u64,
}

impl LoadReport {
    pub fn skipped(&self) -> u64 {
        (self.input_rows as u64).saturating_sub(self.inserted)
    }
}

/// Check that `table` carries every column of `schema`. Returns, in schema
/// order, the index of each required column within `table`.
pub fn validate(table: &Table, schema: &TableSchema) -> Result<Vec<usize>> {
    let mut indexes = Vec::with_capacity(schema.columns.len());
    let mut missing = Vec::new();
    for col in &schema.columns {
        match table.columns.iter().position(|c| c == col) {
            Some(i) => indexes.push(i),
            None => missing.push(col.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(AppError::Schema {
            table: schema.name.clone(),
            missing,
        });
    }

    let extras: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| !schema.columns.contains(c))
        .collect();
    if !extras.is_empty() {
        info!(table = %schema.name, "ignoring extra columns {extras:?}");
    }
    Ok(indexes)
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
    let n = sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await?;
    Ok(n)
}

/// Validate, then `INSERT OR IGNORE` every row in one transaction.
///
/// A missing required column fails before anything is written. Re-loading
/// the same rows inserts nothing. Rows with a null key column are skipped.
pub async fn load(pool: &SqlitePool, table: &Table, schema: &TableSchema) -> Result<LoadReport> {
    let indexes = validate(table, schema)?;
    if table.is_empty() {
        return Ok(LoadReport {
            table: schema.name.clone(),
            input_rows: 0,
            inserted: 0,
        });
    }

    let quoted = schema
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let placeholders = vec!["?"; quoted.len()].join(", ");
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(&schema.name)?,
        quoted.join(", "),
        placeholders
    );

    let key_cells: Vec<usize> = schema.key_positions().iter().map(|&p| indexes[p]).collect();
    let before = count_rows(pool, &schema.name).await?;
    let mut null_keys = 0usize;
    let mut tx = pool.begin().await?;
    for row in &table.rows {
        if key_cells.iter().any(|&i| row[i] == SqlValue::Null) {
            null_keys += 1;
            continue;
        }
        let mut query = sqlx::query(&sql);
        for &i in &indexes {
            query = bind_value(query, &row[i]);
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    let after = count_rows(pool, &schema.name).await?;

    if null_keys > 0 {
        warn!(table = %schema.name, rows = null_keys, "[LOAD] skipped rows with a null key");
    }

    let report = LoadReport {
        table: schema.name.clone(),
        input_rows: table.len(),
        inserted: (after - before).max(0) as u64,
    };
    debug!(
        table = %report.table,
        input = report.input_rows,
        inserted = report.inserted,
        "load complete"
    );
    Ok(report)
}

/// Overwrite `columns` on rows that are already stored, matched on the
/// schema's primary key. Returns the number of rows touched.
pub async fn update_columns(
    pool: &SqlitePool,
    table: &Table,
    schema: &TableSchema,
    columns: &[&str],
) -> Result<u64> {
    let indexes = validate(table, schema)?;
    let position = |name: &str| schema.columns.iter().position(|c| c == name);

    let mut set_cells = Vec::with_capacity(columns.len());
    let mut missing = Vec::new();
    for &col in columns {
        match position(col) {
            Some(p) => set_cells.push(indexes[p]),
            None => missing.push(col.to_string()),
        }
    }
    if !missing.is_empty() || schema.primary_key.is_empty() {
        return Err(AppError::Schema {
            table: schema.name.clone(),
            missing,
        });
    }
    let key_cells: Vec<usize> = schema.key_positions().iter().map(|&p| indexes[p]).collect();
    if table.is_empty() {
        return Ok(0);
    }

    let assignments = columns
        .iter()
        .map(|c| quote_ident(c).map(|q| format!("{q} = ?")))
        .collect::<Result<Vec<_>>>()?;
    let filters = schema
        .primary_key
        .iter()
        .map(|c| quote_ident(c).map(|q| format!("{q} = ?")))
        .collect::<Result<Vec<_>>>()?;
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&schema.name)?,
        assignments.join(", "),
        filters.join(" AND ")
    );

    let mut touched = 0u64;
    let mut tx = pool.begin().await?;
    for row in &table.rows {
        let mut query = sqlx::query(&sql);
        for &i in set_cells.iter().chain(key_cells.iter()) {
            query = bind_value(query, &row[i]);
        }
        touched += query.execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(touched)
}

/// Delete every row whose `column` is one of `keys`. Used ahead of a wholesale
/// reload of derived tables.
pub async fn delete_keys(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    keys: &[i64],
) -> Result<u64> {
    if keys.is_empty() {
        return Ok(0);
    }
    let table = quote_ident(table)?;
    let column = quote_ident(column)?;
    let mut deleted = 0u64;
    let mut tx = pool.begin().await?;
    // SQLite caps bound parameters per statement.
    for chunk in keys.chunks(500) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("DELETE FROM {table} WHERE {column} IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for key in chunk {
            query = query.bind(*key);
        }
        deleted += query.execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(deleted)
}
