//! Presence heartbeat repository

use crate::adapter::StorageAdapter;
use crate::error::Result;
use crate::models::{FileId, PresenceRecord, PresenceUpdate, UserId};
use libsql::{params, Connection};

use super::values::{int_or_null, opt_int};

/// libSQL access to a namespace's presence table
pub struct LibSqlPresenceRepository<'a> {
    conn: &'a Connection,
    adapter: &'a StorageAdapter,
}

impl<'a> LibSqlPresenceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, adapter: &'a StorageAdapter) -> Self {
        Self { conn, adapter }
    }

    /// Insert or refresh the (file, user) row. A missing cursor keeps the stored one.
    pub async fn upsert(
        &self,
        file_id: &FileId,
        user_id: &UserId,
        update: PresenceUpdate,
    ) -> Result<()> {
        let table = self.adapter.presence_table();
        let sql = format!(
            "INSERT INTO {table} (scope_id, file_id, user_id, cursor_position, last_seen_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(scope_id, file_id, user_id) DO UPDATE SET
                 last_seen_at = excluded.last_seen_at,
                 cursor_position = COALESCE(excluded.cursor_position, {table}.cursor_position)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    self.adapter.scope_id(),
                    file_id.as_str(),
                    user_id.as_str(),
                    int_or_null(update.cursor_position),
                    update.last_seen_at
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_fresh(
        &self,
        file_id: &FileId,
        since: i64,
        exclude_user: &UserId,
    ) -> Result<Vec<PresenceRecord>> {
        let sql = format!(
            "SELECT user_id, cursor_position, last_seen_at FROM {}
             WHERE scope_id = ? AND file_id = ? AND last_seen_at >= ? AND user_id != ?
             ORDER BY last_seen_at DESC",
            self.adapter.presence_table()
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![
                    self.adapter.scope_id(),
                    file_id.as_str(),
                    since,
                    exclude_user.as_str()
                ],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let user_id: String = row.get(0)?;
            records.push(PresenceRecord {
                file_id: file_id.clone(),
                user_id: UserId::from(user_id),
                cursor_position: opt_int(&row, 1)?,
                last_seen_at: row.get(2)?,
            });
        }
        Ok(records)
    }

    pub async fn delete(&self, file_id: &FileId, user_id: &UserId) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE scope_id = ? AND file_id = ? AND user_id = ?",
            self.adapter.presence_table()
        );
        self.conn
            .execute(
                &sql,
                params![self.adapter.scope_id(), file_id.as_str(), user_id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Delete rows of every scope in the namespace last seen before `cutoff`
    pub async fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE last_seen_at < ?",
            self.adapter.presence_table()
        );
        Ok(self.conn.execute(&sql, [cutoff]).await?)
    }
}
