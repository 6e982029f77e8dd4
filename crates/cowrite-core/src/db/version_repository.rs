//! Version history repository

use crate::adapter::StorageAdapter;
use crate::error::{Error, Result};
use crate::models::{DocumentId, FileId, NewVersion, UserId, VersionId, VersionRecord};
use crate::util::now_millis;
use libsql::{params, Connection, Row};

use super::values::{opt_text, parse_id, text_or_null};

const COLUMNS: &str =
    "id, document_id, file_id, content, version_number, version_note, created_by, created_at";

/// libSQL access to a namespace's version table
pub struct LibSqlVersionRepository<'a> {
    conn: &'a Connection,
    adapter: &'a StorageAdapter,
}

impl<'a> LibSqlVersionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, adapter: &'a StorageAdapter) -> Self {
        Self { conn, adapter }
    }

    pub async fn max_version_number(&self, document_id: &DocumentId) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(version_number), 0) FROM {} WHERE document_id = ?",
            self.adapter.versions_table()
        );
        let mut rows = self.conn.query(&sql, [document_id.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    pub async fn insert(&self, record: &VersionRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.adapter.versions_table()
        );
        self.conn
            .execute(
                &sql,
                params![
                    record.id.as_str(),
                    record.document_id.as_str(),
                    record.file_id.as_str(),
                    record.content.as_str(),
                    record.version_number,
                    text_or_null(record.version_note.as_deref()),
                    text_or_null(record.created_by.as_ref().map(UserId::as_str)),
                    record.created_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Insert with `version_number = max + 1` computed by the same statement
    pub async fn append(&self, version: &NewVersion) -> Result<VersionRecord> {
        let table = self.adapter.versions_table();
        let sql = format!(
            "INSERT INTO {table} ({COLUMNS})
             SELECT ?, ?, ?, ?, COALESCE(MAX(version_number), 0) + 1, ?, ?, ?
             FROM {table} WHERE document_id = ?
             RETURNING version_number"
        );
        let id = VersionId::new();
        let created_at = now_millis();
        let mut rows = self
            .conn
            .query(
                &sql,
                params![
                    id.as_str(),
                    version.document_id.as_str(),
                    version.file_id.as_str(),
                    version.content.as_str(),
                    text_or_null(version.version_note.as_deref()),
                    text_or_null(version.created_by.as_ref().map(UserId::as_str)),
                    created_at,
                    version.document_id.as_str()
                ],
            )
            .await?;

        let version_number: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => {
                return Err(Error::Database(
                    "version append returned no row".to_string(),
                ))
            }
        };

        Ok(VersionRecord {
            id,
            document_id: version.document_id,
            file_id: version.file_id.clone(),
            content: version.content.clone(),
            version_number,
            version_note: version.version_note.clone(),
            created_by: version.created_by.clone(),
            created_at,
        })
    }

    /// Most recently created version of a document
    pub async fn latest(&self, document_id: &DocumentId) -> Result<Option<VersionRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE document_id = ?
             ORDER BY version_number DESC, created_at DESC LIMIT 1",
            self.adapter.versions_table()
        );
        let mut rows = self.conn.query(&sql, [document_id.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_version(&row)?)),
            None => Ok(None),
        }
    }

    /// All versions, highest version number first
    pub async fn list_by_document(&self, document_id: &DocumentId) -> Result<Vec<VersionRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE document_id = ?
             ORDER BY version_number DESC, created_at DESC",
            self.adapter.versions_table()
        );
        let mut rows = self.conn.query(&sql, [document_id.as_str()]).await?;

        let mut versions = Vec::new();
        while let Some(row) = rows.next().await? {
            versions.push(Self::parse_version(&row)?);
        }
        Ok(versions)
    }

    fn parse_version(row: &Row) -> Result<VersionRecord> {
        let id: String = row.get(0)?;
        let document_id: String = row.get(1)?;
        let file_id: String = row.get(2)?;
        Ok(VersionRecord {
            id: parse_id(&id, "version id")?,
            document_id: parse_id(&document_id, "document id")?,
            file_id: FileId::from(file_id),
            content: row.get(3)?,
            version_number: row.get(4)?,
            version_note: opt_text(row, 5)?,
            created_by: opt_text(row, 6)?.map(UserId::from),
            created_at: row.get(7)?,
        })
    }
}
