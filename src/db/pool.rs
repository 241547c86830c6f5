//! Database connection pool

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
}

/// Split a migration script into statements. Semicolons inside `$$` bodies
/// (the enum-creating `DO` blocks) do not end a statement.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_dollar_block = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if c == '$' && chars.peek() == Some(&'$') {
            if let Some(next) = chars.next() {
                current.push(next);
            }
            in_dollar_block = !in_dollar_block;
        } else if c == ';' && !in_dollar_block {
            if has_sql_content(&current) {
                statements.push(current.trim().to_string());
            }
            current.clear();
        }
    }

    if has_sql_content(&current) {
        statements.push(current.trim().to_string());
    }

    statements
}

/// True unless `s` is only whitespace and `--` comments
fn has_sql_content(s: &str) -> bool {
    s.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with("--")
    })
}

/// Run the embedded schema migration.
///
/// Every statement is idempotent, so a failing one is logged and skipped
/// rather than aborting startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let migration_sql = include_str!("migrations/001_initial.sql");
    let statements = split_sql_statements(migration_sql);
    let total = statements.len();
    let mut failed = 0usize;

    for statement in statements {
        if let Err(e) = sqlx::query(&statement).execute(pool).await {
            failed += 1;
            tracing::warn!("Migration statement failed (may already be applied): {}", e);
        }
    }

    tracing::info!(
        "Database migrations completed ({} statements, {} skipped)",
        total,
        failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_dollar_blocks_whole() {
        let sql = r#"
-- header comment
DO $$ BEGIN
    CREATE TYPE t AS ENUM ('A');
EXCEPTION
    WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS x (id BIGSERIAL PRIMARY KEY);
-- trailing comment
"#;
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("-- header comment\nDO $$ BEGIN"));
        assert!(statements[0].ends_with("END $$;"));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS x"));
    }

    #[test]
    fn test_embedded_migration_parses() {
        let statements = split_sql_statements(include_str!("migrations/001_initial.sql"));
        assert!(statements.iter().any(|s| s.contains("CREATE TABLE IF NOT EXISTS requests")));
        assert!(statements.iter().any(|s| s.contains("CREATE TYPE request_status")));
        assert!(statements
            .iter()
            .all(|s| s.trim_end().ends_with(';')));
    }

    #[test]
    fn test_comment_only_input_is_empty() {
        assert!(split_sql_statements("-- nothing\n\n-- here\n").is_empty());
    }
}
