//! Live content repository

use crate::adapter::StorageAdapter;
use crate::error::{Error, Result};
use crate::models::{ContentRecord, ContentUpdate, DocumentId, FileId, UserId};
use libsql::{params, Connection, Row};

use super::values::{opt_text, parse_id, text_or_null};

const COLUMNS: &str =
    "id, file_id, content, content_type, last_edited_by, updated_at, needs_parse_retry";

/// libSQL access to a namespace's content table
pub struct LibSqlContentRepository<'a> {
    conn: &'a Connection,
    adapter: &'a StorageAdapter,
}

impl<'a> LibSqlContentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, adapter: &'a StorageAdapter) -> Self {
        Self { conn, adapter }
    }

    /// Fetch the record for a file within the adapter's scope
    pub async fn get(&self, file_id: &FileId) -> Result<Option<ContentRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE scope_id = ? AND file_id = ?",
            self.adapter.documents_table()
        );
        let mut rows = self
            .conn
            .query(&sql, params![self.adapter.scope_id(), file_id.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Fetch a record by its document id
    pub async fn get_by_id(&self, document_id: &DocumentId) -> Result<Option<ContentRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE id = ?",
            self.adapter.documents_table()
        );
        let mut rows = self.conn.query(&sql, [document_id.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, record: &ContentRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, scope_id, file_id, content, content_type, last_edited_by, updated_at, needs_parse_retry)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.adapter.documents_table()
        );
        let result = self
            .conn
            .execute(
                &sql,
                params![
                    record.id.as_str(),
                    self.adapter.scope_id(),
                    record.file_id.as_str(),
                    record.content.as_str(),
                    record.content_type.as_str(),
                    text_or_null(record.last_edited_by.as_ref().map(UserId::as_str)),
                    record.updated_at,
                    i64::from(record.needs_parse_retry)
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                let error = Error::from(error);
                if error.is_unique_violation() {
                    Err(Error::Conflict(format!(
                        "document already exists for file {}",
                        record.file_id
                    )))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Overwrite content unconditionally (last write wins)
    pub async fn update(
        &self,
        document_id: &DocumentId,
        update: &ContentUpdate,
    ) -> Result<ContentRecord> {
        let sql = format!(
            "UPDATE {} SET content = ?, last_edited_by = ?, updated_at = ?, needs_parse_retry = 0
             WHERE id = ? AND scope_id = ?",
            self.adapter.documents_table()
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params![
                    update.content.as_str(),
                    update.last_edited_by.as_str(),
                    update.updated_at,
                    document_id.as_str(),
                    self.adapter.scope_id()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(document_id.to_string()));
        }

        self.get_by_id(document_id)
            .await?
            .ok_or_else(|| Error::NotFound(document_id.to_string()))
    }

    /// Store parsed content without touching authorship
    pub async fn mark_parsed(&self, document_id: &DocumentId, content: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET content = ?, needs_parse_retry = 0 WHERE id = ? AND scope_id = ?",
            self.adapter.documents_table()
        );
        let rows = self
            .conn
            .execute(
                &sql,
                params![content, document_id.as_str(), self.adapter.scope_id()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(document_id.to_string()));
        }
        Ok(())
    }

    fn parse_record(row: &Row) -> Result<ContentRecord> {
        let id: String = row.get(0)?;
        let file_id: String = row.get(1)?;
        let content_type: String = row.get(3)?;
        Ok(ContentRecord {
            id: parse_id(&id, "document id")?,
            file_id: FileId::from(file_id),
            content: row.get(2)?,
            content_type: content_type.parse()?,
            last_edited_by: opt_text(row, 4)?.map(UserId::from),
            updated_at: row.get(5)?,
            needs_parse_retry: row.get::<i64>(6)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ContentType;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get() {
        let db = setup().await;
        let adapter = StorageAdapter::drive();
        let repo = LibSqlContentRepository::new(db.connection(), &adapter);

        let record = ContentRecord::new(
            FileId::from("f1"),
            "<p>Hello</p>",
            ContentType::RichText,
            Some(UserId::from("alice")),
        );
        repo.insert(&record).await.unwrap();

        let fetched = repo.get(&FileId::from("f1")).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_file_is_conflict() {
        let db = setup().await;
        let adapter = StorageAdapter::drive();
        let repo = LibSqlContentRepository::new(db.connection(), &adapter);

        let file = FileId::from("f1");
        repo.insert(&ContentRecord::placeholder(file.clone(), ContentType::RichText, None))
            .await
            .unwrap();
        let error = repo
            .insert(&ContentRecord::placeholder(file, ContentType::RichText, None))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_overwrites_and_clears_retry_flag() {
        let db = setup().await;
        let adapter = StorageAdapter::drive();
        let repo = LibSqlContentRepository::new(db.connection(), &adapter);

        let record = ContentRecord::placeholder(FileId::from("f1"), ContentType::RichText, None);
        repo.insert(&record).await.unwrap();

        let updated = repo
            .update(
                &record.id,
                &ContentUpdate::new("<p>typed</p>", UserId::from("bob")),
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "<p>typed</p>");
        assert_eq!(updated.last_edited_by, Some(UserId::from("bob")));
        assert!(!updated.needs_parse_retry);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scopes_are_isolated() {
        let db = setup().await;
        let room_a = StorageAdapter::data_room("a");
        let room_b = StorageAdapter::data_room("b");
        let repo_a = LibSqlContentRepository::new(db.connection(), &room_a);
        let repo_b = LibSqlContentRepository::new(db.connection(), &room_b);

        let file = FileId::from("shared-name");
        repo_a
            .insert(&ContentRecord::new(file.clone(), "a", ContentType::PlainText, None))
            .await
            .unwrap();
        assert!(repo_b.get(&file).await.unwrap().is_none());
        repo_b
            .insert(&ContentRecord::new(file.clone(), "b", ContentType::PlainText, None))
            .await
            .unwrap();
        assert_eq!(repo_a.get(&file).await.unwrap().unwrap().content, "a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_unknown_document_is_not_found() {
        let db = setup().await;
        let adapter = StorageAdapter::drive();
        let repo = LibSqlContentRepository::new(db.connection(), &adapter);

        let error = repo
            .update(&DocumentId::new(), &ContentUpdate::new("x", UserId::from("a")))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }
}
