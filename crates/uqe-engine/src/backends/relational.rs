use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uqe_core::{QueryError, Row};

use super::RelationalExecutor;
use crate::db::EngineDb;
use crate::helpers::{json_to_sql, row_to_json};

/// Runs relational statements against the engine's libSQL database.
///
/// Each call opens its own connection and drops it on every exit path. A
/// statement that outlives its deadline is interrupted on that connection.
pub struct LibsqlExecutor {
    db: Arc<EngineDb>,
}

impl LibsqlExecutor {
    #[must_use]
    pub const fn new(db: Arc<EngineDb>) -> Self {
        Self { db }
    }
}

async fn run(
    conn: &libsql::Connection,
    sql: &str,
    params: Vec<libsql::Value>,
) -> Result<Vec<Row>, QueryError> {
    let mut rows = conn
        .query(sql, libsql::params_from_iter(params))
        .await
        .map_err(|e| QueryError::Execution(e.to_string()))?;
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| QueryError::Execution(e.to_string()))?
    {
        out.push(row_to_json(&row).map_err(|e| QueryError::Execution(e.to_string()))?);
    }
    Ok(out)
}

#[async_trait]
impl RelationalExecutor for LibsqlExecutor {
    async fn query(
        &self,
        statement: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>, QueryError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| QueryError::Connection(e.to_string()))?;
        let sql = rewrite_placeholders(statement);
        let params = args.iter().map(json_to_sql).collect::<Vec<_>>();

        let Some(limit) = timeout else {
            return run(&conn, &sql, params).await;
        };

        // Local statements execute inside a single poll, so the statement
        // runs on a blocking thread while this task watches the deadline.
        let worker = conn.clone();
        let runtime = tokio::runtime::Handle::current();
        let task =
            tokio::task::spawn_blocking(move || runtime.block_on(run(&worker, &sql, params)));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(QueryError::Execution(format!("statement task failed: {join}"))),
            Err(_) => {
                if let Err(error) = conn.interrupt() {
                    tracing::debug!(%error, "statement interrupt failed");
                }
                let ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms = ms, "relational statement interrupted");
                Err(QueryError::Timeout(ms))
            }
        }
    }
}

/// Rewrite `$N` placeholders to libSQL's `?N`, leaving quoted text alone.
#[must_use]
pub fn rewrite_placeholders(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut quote: Option<char> = None;
    let mut chars = statement.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '$' && chars.peek().is_some_and(char::is_ascii_digit) => out.push('?'),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn seeded() -> (tempfile::TempDir, LibsqlExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let db = EngineDb::open_local(path.to_str().unwrap()).await.unwrap();
        db.conn()
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, active INTEGER);
                 INSERT INTO users VALUES (1, 'alice', 1), (2, 'bob', 0), (3, 'carol', 1);",
            )
            .await
            .unwrap();
        (dir, LibsqlExecutor::new(Arc::new(db)))
    }

    #[test]
    fn placeholders_are_rewritten_outside_quotes() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE a = $1 AND b = '$2' AND c = $10"),
            "SELECT * FROM t WHERE a = ?1 AND b = '$2' AND c = ?10"
        );
        assert_eq!(rewrite_placeholders(r#"SELECT "$1" FROM t"#), r#"SELECT "$1" FROM t"#);
        assert_eq!(rewrite_placeholders("SELECT '$' || $x"), "SELECT '$' || $x");
    }

    #[tokio::test]
    async fn binds_positional_arguments() {
        let (_dir, executor) = seeded().await;
        let rows = executor
            .query(
                "SELECT id, name FROM users WHERE active = $1 AND id > $2 ORDER BY id",
                &[json!(true), json!(1)],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("carol"));
    }

    #[tokio::test]
    async fn slow_statements_are_interrupted_at_the_deadline() {
        let (_dir, executor) = seeded().await;
        let started = std::time::Instant::now();
        let err = executor
            .query(
                "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c WHERE n < 500000000)
                 SELECT MAX(n) AS n FROM c",
                &[],
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(50)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));

        // The database stays usable after the interrupt.
        let rows = executor
            .query("SELECT COUNT(*) AS n FROM users", &[], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(3));
    }

    #[tokio::test]
    async fn sql_errors_are_execution_errors() {
        let (_dir, executor) = seeded().await;
        let err = executor
            .query("SELECT nope FROM missing_table", &[], Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Execution(_)), "{err:?}");
    }
}
