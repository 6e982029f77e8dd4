//! Database migrations

use crate::adapter::DocumentNamespace;
use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Tables backing one document namespace
fn namespace_statements(namespace: DocumentNamespace) -> Vec<String> {
    let documents = namespace.documents_table();
    let versions = namespace.versions_table();
    let presence = namespace.presence_table();

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {documents} (
                id TEXT PRIMARY KEY,
                scope_id TEXT NOT NULL DEFAULT '',
                file_id TEXT NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                last_edited_by TEXT,
                updated_at INTEGER NOT NULL,
                needs_parse_retry INTEGER NOT NULL DEFAULT 0
            )"
        ),
        // One live document per file
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{documents}_file ON {documents}(scope_id, file_id)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {versions} (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES {documents}(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL,
                content TEXT NOT NULL,
                version_number INTEGER NOT NULL,
                version_note TEXT,
                created_by TEXT,
                created_at INTEGER NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{versions}_document
             ON {versions}(document_id, version_number DESC)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {presence} (
                scope_id TEXT NOT NULL DEFAULT '',
                file_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                cursor_position INTEGER,
                last_seen_at INTEGER NOT NULL,
                PRIMARY KEY (scope_id, file_id, user_id)
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{presence}_seen ON {presence}(last_seen_at)"),
    ]
}

/// Run `statements` in one transaction and record `version`
async fn apply(conn: &Connection, version: i32, statements: Vec<String>) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let record = format!("INSERT INTO schema_version (version) VALUES ({version})");
    for stmt in statements.iter().chain(std::iter::once(&record)) {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: user directory and drive documents
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut statements = vec![
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )"
        .to_string(),
    ];
    statements.extend(namespace_statements(DocumentNamespace::Drive));
    apply(conn, 1, statements).await
}

/// Migration to version 2: data room documents
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        CURRENT_VERSION,
        namespace_statements(DocumentNamespace::DataRoom),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [name],
            )
            .await
            .unwrap();
        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_namespace_gets_its_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        assert!(table_exists(&conn, "profiles").await);
        for namespace in DocumentNamespace::ALL {
            assert!(table_exists(&conn, namespace.documents_table()).await);
            assert!(table_exists(&conn, namespace.versions_table()).await);
            assert!(table_exists(&conn, namespace.presence_table()).await);
        }
    }
}
