pub mod loader;
pub mod models;
pub mod schema;
pub mod table;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::db::schema::{quote_ident, TableSchema};
use crate::error::Result;

pub use loader::{load, LoadReport};
pub use table::Table;

/// Open (creating if needed) the database file and apply migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let options =
        SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?.create_if_missing(true);
    // The store serializes writes; one writer connection is enough.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Create the training table for `schema` if absent and add any feature
/// column a changed stat set introduced since it was created.
pub async fn ensure_training_table(pool: &SqlitePool, schema: &TableSchema) -> Result<()> {
    sqlx::query(&schema.training_ddl()?).execute(pool).await?;

    let info_sql = format!("PRAGMA table_info({})", quote_ident(&schema.name)?);
    let existing: Vec<String> = sqlx::query(&info_sql)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<_, _>>()?;

    for col in schema.columns.iter().filter(|c| !existing.contains(c)) {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} REAL",
            quote_ident(&schema.name)?,
            quote_ident(col)?
        );
        sqlx::query(&sql).execute(pool).await?;
        info!(table = %schema.name, column = %col, "added training column");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureMode;

    #[tokio::test]
    async fn training_table_grows_with_new_stats() {
        let pool = test_pool().await;
        let first = TableSchema::training(FeatureMode::Wide, &["a_min_Team0".to_string()]);
        ensure_training_table(&pool, &first).await.unwrap();
        let second = TableSchema::training(
            FeatureMode::Wide,
            &["a_min_Team0".to_string(), "b_min_Team0".to_string()],
        );
        ensure_training_table(&pool, &second).await.unwrap();

        let cols: Vec<String> = sqlx::query("PRAGMA table_info(\"training_features\")")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|r| r.get::<String, _>("name"))
            .collect();
        assert_eq!(cols, vec!["match_id", "team0_won", "a_min_Team0", "b_min_Team0"]);
    }
}
