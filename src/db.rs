//! SQLite connection setup and the statement-by-statement migration runner.

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

/// Open the pool, creating the database file and its parent directory when
/// the URL points at a local file.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    if !db_path.starts_with(":memory:") {
        let db_path = Path::new(db_path);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
                tracing::info!(path = %parent.display(), "created database directory");
            }
        }
        if !db_path.exists() {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(db_path)
                .await
                .with_context(|| format!("creating database file {}", db_path.display()))?;
        }
    }

    tracing::debug!(url = database_url, "connecting to sqlite");
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .with_context(|| format!("connecting to {database_url}"))?;
    Ok(pool)
}

/// Run the migration file at `path`.
pub async fn run_migrations(db: &SqlitePool, path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Migration file not found: {}", path.display());
    }
    let sql = tokio::fs::read_to_string(path).await?;
    apply_sql(db, &sql).await
}

/// Execute `;`-separated statements one at a time.
pub async fn apply_sql(db: &SqlitePool, sql: &str) -> Result<()> {
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt)
            .execute(db)
            .await
            .with_context(|| format!("executing `{stmt}`"))?;
    }

    Ok(())
}
