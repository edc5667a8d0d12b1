use sqlx::Connection;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::info;

/// Create and initialize a SQLite connection pool with WAL mode.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("database connected: {}", database_url);
    Ok(pool)
}

/// Split SQL text into single statements, dropping comment-only lines.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") && current.trim().is_empty() {
            continue;
        }

        current.push_str(line);
        current.push('\n');

        while let Some(pos) = current.find(';') {
            let stmt = current[..pos].trim().to_string();
            if !stmt.is_empty() && !stmt.starts_with("--") {
                statements.push(stmt);
            }
            current = current[pos + 1..].to_string();
        }
    }

    let remaining = current.trim().to_string();
    if !remaining.is_empty() && !remaining.starts_with("--") {
        statements.push(remaining);
    }

    statements
}

/// Run all pending migration SQL files against the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Ensure schema_version table exists for tracking
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (\
            version     INTEGER PRIMARY KEY, \
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))\
        )",
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await?;

    let migrations: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_initial.sql"))];

    for &(version, sql) in migrations {
        if version <= current_version {
            continue;
        }
        info!("applying migration {version}...");
        let mut conn = pool.acquire().await?;
        // Wrap all migration statements + version recording in a transaction
        // so a partial failure cannot leave the schema in an inconsistent state.
        let mut tx = conn.begin().await?;
        for statement in split_sql_statements(sql) {
            if !statement.is_empty() {
                sqlx::query(&statement).execute(&mut *tx).await?;
            }
        }
        sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    let final_version = migrations.last().map(|m| m.0).unwrap_or(0);
    info!("database migrations applied (version: {final_version})");
    Ok(())
}
