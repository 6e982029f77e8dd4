//! User directory repository

use std::collections::HashMap;

use crate::error::Result;
use crate::models::UserId;
use crate::util::now_millis;
use libsql::{params, Connection, Value};

/// libSQL access to display names
pub struct LibSqlProfileRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlProfileRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Resolve display names for a set of ids with one query
    pub async fn resolve_names(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, String>> {
        let mut ids: Vec<&str> = user_ids.iter().map(UserId::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT user_id, display_name FROM profiles WHERE user_id IN ({placeholders})"
        );
        let values: Vec<Value> = ids.iter().map(|id| Value::Text((*id).to_string())).collect();
        let mut rows = self.conn.query(&sql, values).await?;

        let mut names = HashMap::new();
        while let Some(row) = rows.next().await? {
            let user_id: String = row.get(0)?;
            let display_name: String = row.get(1)?;
            names.insert(UserId::from(user_id), display_name);
        }
        Ok(names)
    }

    pub async fn upsert(&self, user_id: &UserId, display_name: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO profiles (user_id, display_name, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                     display_name = excluded.display_name,
                     updated_at = excluded.updated_at",
                params![user_id.as_str(), display_name.trim(), now_millis()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_names_batches_and_skips_unknown() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlProfileRepository::new(db.connection());

        repo.upsert(&UserId::from("alice"), "Alice").await.unwrap();
        repo.upsert(&UserId::from("bob"), "Bobby").await.unwrap();
        repo.upsert(&UserId::from("bob"), " Bob ").await.unwrap();

        let names = repo
            .resolve_names(&[
                UserId::from("alice"),
                UserId::from("bob"),
                UserId::from("alice"),
                UserId::from("ghost"),
            ])
            .await
            .unwrap();

        assert_eq!(names.len(), 2);
        assert_eq!(names[&UserId::from("alice")], "Alice");
        assert_eq!(names[&UserId::from("bob")], "Bob");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_empty_set() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlProfileRepository::new(db.connection());
        assert!(repo.resolve_names(&[]).await.unwrap().is_empty());
    }
}
