use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::lock;
use super::traits::{validate_indicator, CatalogStore};
use crate::domain::{
    Category, DataModel, Indicator, RawUpload, ReportArtifact, UploadStatus, UploadedFile,
};
use crate::error::{EtlError, Result};

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA foreign_keys=ON;
CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS data_models (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS indicators (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    description      TEXT NOT NULL,
    category_id      TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    data_model_id    TEXT REFERENCES data_models(id) ON DELETE SET NULL,
    visibility       TEXT NOT NULL,
    file_format      TEXT NOT NULL,
    uploaded_by      TEXT,
    created_at       TEXT NOT NULL,
    is_processed     INTEGER NOT NULL,
    processing_notes TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS indicators_category ON indicators(category_id);
CREATE INDEX IF NOT EXISTS indicators_visibility ON indicators(visibility);
CREATE TABLE IF NOT EXISTS raw_uploads (
    id                      TEXT PRIMARY KEY,
    file_name               TEXT NOT NULL,
    file_bytes              BLOB NOT NULL,
    file_format             TEXT NOT NULL,
    category_id             TEXT REFERENCES categories(id) ON DELETE SET NULL,
    uploaded_by             TEXT,
    uploaded_at             TEXT NOT NULL,
    status                  TEXT NOT NULL,
    processing_started_at   TEXT,
    processing_completed_at TEXT,
    report                  TEXT,
    error_message           TEXT,
    total_rows              INTEGER NOT NULL DEFAULT 0,
    processed_rows          INTEGER NOT NULL DEFAULT 0,
    failed_rows             INTEGER NOT NULL DEFAULT 0,
    output_name             TEXT,
    output_bytes            BLOB
);
CREATE INDEX IF NOT EXISTS raw_uploads_status ON raw_uploads(status);
CREATE INDEX IF NOT EXISTS raw_uploads_uploaded_by ON raw_uploads(uploaded_by);
"#;

const INDICATOR_COLUMNS: &str = "id, title, description, category_id, data_model_id, visibility, \
     file_format, uploaded_by, created_at, is_processed, processing_notes";

const UPLOAD_COLUMNS: &str = "id, file_name, file_bytes, file_format, category_id, uploaded_by, \
     uploaded_at, status, processing_started_at, processing_completed_at, report, error_message, \
     total_rows, processed_rows, failed_rows, output_name, output_bytes";

/// SQLite-backed catalog store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening catalog database at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_text<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional<T>(idx: usize, value: Option<String>) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map(|v| parse_text(idx, v)).transpose()
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: Some(parse_text(0, row.get(0)?)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn data_model_from_row(row: &Row<'_>) -> rusqlite::Result<DataModel> {
    Ok(DataModel {
        id: Some(parse_text(0, row.get(0)?)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn indicator_from_row(row: &Row<'_>) -> rusqlite::Result<Indicator> {
    Ok(Indicator {
        id: Some(parse_text(0, row.get(0)?)?),
        title: row.get(1)?,
        description: row.get(2)?,
        category_id: parse_text(3, row.get(3)?)?,
        data_model_id: parse_optional(4, row.get(4)?)?,
        visibility: parse_text(5, row.get(5)?)?,
        file_format: parse_text(6, row.get(6)?)?,
        uploaded_by: row.get(7)?,
        created_at: row.get(8)?,
        is_processed: row.get(9)?,
        processing_notes: row.get(10)?,
    })
}

fn upload_from_row(row: &Row<'_>) -> rusqlite::Result<RawUpload> {
    let output_name: Option<String> = row.get(15)?;
    let output_bytes: Option<Vec<u8>> = row.get(16)?;
    Ok(RawUpload {
        id: Some(parse_text(0, row.get(0)?)?),
        file: UploadedFile {
            name: row.get(1)?,
            bytes: row.get(2)?,
        },
        file_format: parse_text(3, row.get(3)?)?,
        category_id: parse_optional(4, row.get(4)?)?,
        uploaded_by: row.get(5)?,
        uploaded_at: row.get(6)?,
        status: parse_text(7, row.get(7)?)?,
        processing_started_at: row.get(8)?,
        processing_completed_at: row.get(9)?,
        report: row.get(10)?,
        error_message: row.get(11)?,
        total_rows: row.get::<_, i64>(12)? as usize,
        processed_rows: row.get::<_, i64>(13)? as usize,
        failed_rows: row.get::<_, i64>(14)? as usize,
        output: output_name.map(|file_name| ReportArtifact {
            file_name,
            bytes: output_bytes.unwrap_or_default(),
        }),
    })
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn create_category(&self, category: &mut Category) -> Result<()> {
        let id = Uuid::new_v4();
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO categories (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), category.name, category.description, category.created_at],
        )?;
        category.id = Some(id);

        debug!("Created category: {} with id {}", category.name, id);
        Ok(())
    }

    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>> {
        let conn = lock(&self.conn)?;
        let category = conn
            .query_row(
                "SELECT id, name, description, created_at FROM categories WHERE id = ?1",
                params![category_id.to_string()],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT id, name, description, created_at FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    async fn get_or_create_data_model(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(DataModel, bool)> {
        let conn = lock(&self.conn)?;
        let inserted = conn.execute(
            "INSERT INTO data_models (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO NOTHING",
            params![Uuid::new_v4().to_string(), name, description, Utc::now()],
        )?;
        let model = conn.query_row(
            "SELECT id, name, description, created_at FROM data_models WHERE name = ?1",
            params![name],
            data_model_from_row,
        )?;

        if inserted > 0 {
            debug!("Created data model: {}", name);
        }
        Ok((model, inserted > 0))
    }

    async fn list_data_models(&self) -> Result<Vec<DataModel>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT id, name, description, created_at FROM data_models ORDER BY name")?;
        let models = stmt
            .query_map([], data_model_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(models)
    }

    async fn create_indicator(&self, indicator: &mut Indicator) -> Result<()> {
        validate_indicator(indicator)?;

        let id = Uuid::new_v4();
        let conn = lock(&self.conn)?;
        conn.execute(
            &format!(
                "INSERT INTO indicators ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                INDICATOR_COLUMNS
            ),
            params![
                id.to_string(),
                indicator.title,
                indicator.description,
                indicator.category_id.to_string(),
                indicator.data_model_id.map(|m| m.to_string()),
                indicator.visibility.as_str(),
                indicator.file_format.as_str(),
                indicator.uploaded_by,
                indicator.created_at,
                indicator.is_processed,
                indicator.processing_notes,
            ],
        )?;
        indicator.id = Some(id);

        debug!("Created indicator: {} with id {}", indicator.title, id);
        Ok(())
    }

    async fn get_indicator(&self, indicator_id: Uuid) -> Result<Option<Indicator>> {
        let conn = lock(&self.conn)?;
        let indicator = conn
            .query_row(
                &format!("SELECT {} FROM indicators WHERE id = ?1", INDICATOR_COLUMNS),
                params![indicator_id.to_string()],
                indicator_from_row,
            )
            .optional()?;
        Ok(indicator)
    }

    async fn get_indicators_by_category(&self, category_id: Uuid) -> Result<Vec<Indicator>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM indicators WHERE category_id = ?1 ORDER BY created_at DESC",
            INDICATOR_COLUMNS
        ))?;
        let indicators = stmt
            .query_map(params![category_id.to_string()], indicator_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(indicators)
    }

    async fn create_upload(&self, upload: &mut RawUpload) -> Result<()> {
        let id = Uuid::new_v4();
        let conn = lock(&self.conn)?;
        conn.execute(
            &format!(
                "INSERT INTO raw_uploads ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                UPLOAD_COLUMNS
            ),
            params![
                id.to_string(),
                upload.file.name,
                upload.file.bytes,
                upload.file_format.as_str(),
                upload.category_id.map(|c| c.to_string()),
                upload.uploaded_by,
                upload.uploaded_at,
                upload.status.as_str(),
                upload.processing_started_at,
                upload.processing_completed_at,
                upload.report,
                upload.error_message,
                upload.total_rows as i64,
                upload.processed_rows as i64,
                upload.failed_rows as i64,
                upload.output.as_ref().map(|o| o.file_name.clone()),
                upload.output.as_ref().map(|o| o.bytes.clone()),
            ],
        )?;
        upload.id = Some(id);

        debug!("Created upload: {} with id {}", upload.file.name, id);
        Ok(())
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<RawUpload>> {
        let conn = lock(&self.conn)?;
        let upload = conn
            .query_row(
                &format!("SELECT {} FROM raw_uploads WHERE id = ?1", UPLOAD_COLUMNS),
                params![upload_id.to_string()],
                upload_from_row,
            )
            .optional()?;
        Ok(upload)
    }

    async fn update_upload(&self, upload: &RawUpload) -> Result<()> {
        let upload_id = upload
            .id
            .ok_or_else(|| EtlError::storage("Cannot update upload without ID"))?;

        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE raw_uploads SET
                category_id = ?2, status = ?3, processing_started_at = ?4,
                processing_completed_at = ?5, report = ?6, error_message = ?7,
                total_rows = ?8, processed_rows = ?9, failed_rows = ?10,
                output_name = ?11, output_bytes = ?12
             WHERE id = ?1",
            params![
                upload_id.to_string(),
                upload.category_id.map(|c| c.to_string()),
                upload.status.as_str(),
                upload.processing_started_at,
                upload.processing_completed_at,
                upload.report,
                upload.error_message,
                upload.total_rows as i64,
                upload.processed_rows as i64,
                upload.failed_rows as i64,
                upload.output.as_ref().map(|o| o.file_name.clone()),
                upload.output.as_ref().map(|o| o.bytes.clone()),
            ],
        )?;
        if changed == 0 {
            return Err(EtlError::NotFound {
                entity: "upload",
                id: upload_id,
            });
        }

        debug!("Updated upload {} to {}", upload_id, upload.status);
        Ok(())
    }

    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<RawUpload>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM raw_uploads WHERE (?1 IS NULL OR status = ?1) ORDER BY uploaded_at DESC",
            UPLOAD_COLUMNS
        ))?;
        let uploads = stmt
            .query_map(params![status.map(|s| s.as_str())], upload_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileFormat, Visibility};
    use tempfile::tempdir;

    fn category(name: &str) -> Category {
        Category {
            id: None,
            name: name.to_string(),
            description: "desc".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_category_round_trip_and_uniqueness() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut cat = category("Santé");
        store.create_category(&mut cat).await.unwrap();

        let loaded = store.get_category(cat.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Santé");
        assert!(store.get_category(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.create_category(&mut category("Santé")).await.is_err());
    }

    #[tokio::test]
    async fn test_data_model_insert_if_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (first, created) = store.get_or_create_data_model("Santé", "Modèle pour Santé").await.unwrap();
        assert!(created);
        let (second, created) = store.get_or_create_data_model("Santé", "other").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_data_models().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_indicator_foreign_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut indicator = Indicator {
            id: None,
            title: "Taux".to_string(),
            description: "d".to_string(),
            category_id: Uuid::new_v4(),
            data_model_id: None,
            visibility: Visibility::Public,
            file_format: FileFormat::Excel,
            uploaded_by: None,
            created_at: Utc::now(),
            is_processed: true,
            processing_notes: "n".to_string(),
        };
        assert!(store.create_indicator(&mut indicator).await.is_err());

        let mut cat = category("Éducation");
        store.create_category(&mut cat).await.unwrap();
        indicator.category_id = cat.id.unwrap();
        store.create_indicator(&mut indicator).await.unwrap();

        let loaded = store.get_indicator(indicator.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Taux");
        assert_eq!(loaded.visibility, Visibility::Public);
        assert!(loaded.is_processed);
    }

    #[tokio::test]
    async fn test_upload_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        let upload_id = {
            let store = SqliteStore::open(&path).unwrap();
            let mut upload = RawUpload::new(
                "data.csv",
                b"title\nA\n".to_vec(),
                FileFormat::Csv,
                None,
                Some("admin".to_string()),
            );
            store.create_upload(&mut upload).await.unwrap();

            upload.status = UploadStatus::Completed;
            upload.total_rows = 1;
            upload.processed_rows = 1;
            upload.output = Some(ReportArtifact {
                file_name: "etl_output.xlsx".to_string(),
                bytes: vec![1, 2, 3],
            });
            store.update_upload(&upload).await.unwrap();
            upload.id.unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get_upload(upload_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, UploadStatus::Completed);
        assert_eq!(loaded.file.bytes, b"title\nA\n".to_vec());
        assert_eq!(loaded.uploaded_by.as_deref(), Some("admin"));
        assert_eq!(loaded.output.unwrap().bytes, vec![1, 2, 3]);

        assert_eq!(store.list_uploads(Some(UploadStatus::Completed)).await.unwrap().len(), 1);
        assert!(store.list_uploads(Some(UploadStatus::Pending)).await.unwrap().is_empty());
    }
}
