//! Upload intake operations: accept a file, run it through the pipeline, and
//! serve the resulting report.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{Category, FileFormat, RawUpload, ReportArtifact, UploadStatus, Visibility};
use crate::error::{EtlError, Result};
use crate::observability;
use crate::pipeline::lifecycle::{ProcessingOutcome, UploadProcessor};
use crate::pipeline::storage::{CatalogStore, InMemoryStore, SqliteStore};

pub const CATEGORY_REQUIRED: &str = "Catégorie requise";
pub const CATEGORY_NOT_FOUND: &str = "Catégorie introuvable";
pub const NOT_YET_PROCESSED: &str = "Le fichier n'a pas encore été traité avec succès";

/// Download route handed back to clients for a completed upload
pub fn download_path(upload_id: Uuid) -> String {
    format!("/api/etl/uploads/{}/download/", upload_id)
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Declared format tag, e.g. "CSV" or "EXCEL"
    pub format: String,
    pub category_id: Option<Uuid>,
    pub visibility: Visibility,
    pub uploaded_by: Option<String>,
}

/// JSON body returned by `upload_and_process`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntakeResponse {
    Success {
        id: Uuid,
        file_name: String,
        status: UploadStatus,
        total_rows: usize,
        processed_rows: usize,
        failed_rows: usize,
        message: String,
        output_file: String,
    },
    Failure {
        error: String,
    },
}

impl IntakeResponse {
    fn failure(error: impl Into<String>) -> Self {
        IntakeResponse::Failure {
            error: error.into(),
        }
    }

    fn from_outcome(file_name: &str, outcome: ProcessingOutcome) -> Self {
        if !outcome.success {
            return Self::failure(outcome.message);
        }
        IntakeResponse::Success {
            id: outcome.upload_id,
            file_name: file_name.to_string(),
            status: outcome.status,
            total_rows: outcome.total_rows,
            processed_rows: outcome.processed_rows,
            failed_rows: outcome.failed_rows,
            message: outcome.message,
            output_file: download_path(outcome.upload_id),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IntakeResponse::Success { .. })
    }

    pub fn upload_id(&self) -> Option<Uuid> {
        match self {
            IntakeResponse::Success { id, .. } => Some(*id),
            IntakeResponse::Failure { .. } => None,
        }
    }
}

pub struct IntakeService {
    store: Arc<dyn CatalogStore>,
    processor: UploadProcessor,
}

impl IntakeService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            processor: UploadProcessor::new(store.clone()),
            store,
        }
    }

    /// Opens the SQLite store named in the config, or an in-memory one.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn CatalogStore> = match &config.database_path {
            Some(path) => {
                info!("Using SQLite catalog at {}", path.display());
                Arc::new(SqliteStore::open(path)?)
            }
            None => {
                info!("Using in-memory catalog");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::new(store))
    }

    pub fn store(&self) -> Arc<dyn CatalogStore> {
        self.store.clone()
    }

    pub async fn add_category(&self, name: &str, description: &str) -> Result<Category> {
        let mut category = Category {
            id: None,
            name: name.trim().to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_category(&mut category).await?;
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.store.list_categories().await
    }

    /// Accept an upload and process it right away.
    ///
    /// Every failure, whether the request is rejected or the pipeline fails,
    /// comes back as `IntakeResponse::Failure`.
    pub async fn upload_and_process(&self, request: UploadRequest) -> IntakeResponse {
        let format: FileFormat = match request.format.parse() {
            Ok(format) => format,
            Err(e) => {
                observability::upload_rejected("unsupported_format");
                return IntakeResponse::failure(e.to_string());
            }
        };
        let Some(category_id) = request.category_id else {
            observability::upload_rejected("missing_category");
            return IntakeResponse::failure(CATEGORY_REQUIRED);
        };
        match self.store.get_category(category_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                observability::upload_rejected("unknown_category");
                return IntakeResponse::failure(CATEGORY_NOT_FOUND);
            }
            Err(e) => return IntakeResponse::failure(e.to_string()),
        }

        let upload = match self
            .create_upload(
                &request.file_name,
                request.bytes,
                format,
                Some(category_id),
                request.uploaded_by,
            )
            .await
        {
            Ok(upload) => upload,
            Err(e) => return IntakeResponse::failure(e.to_string()),
        };
        let Some(upload_id) = upload.id else {
            return IntakeResponse::failure("upload was stored without an id");
        };

        match self.processor.run(upload_id, request.visibility).await {
            Ok(outcome) => IntakeResponse::from_outcome(&request.file_name, outcome),
            Err(e) => {
                warn!("Upload {} could not be processed: {}", upload_id, e);
                IntakeResponse::failure(e.to_string())
            }
        }
    }

    /// Store a new PENDING upload without processing it
    pub async fn create_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        format: FileFormat,
        category_id: Option<Uuid>,
        uploaded_by: Option<String>,
    ) -> Result<RawUpload> {
        let mut upload = RawUpload::new(file_name, bytes, format, category_id, uploaded_by);
        self.store.create_upload(&mut upload).await?;
        info!(
            "Stored upload {} ({}, {} bytes)",
            file_name,
            format,
            upload.file.bytes.len()
        );
        Ok(upload)
    }

    /// Process a stored upload; only PENDING uploads with a category are accepted
    pub async fn process_upload(
        &self,
        upload_id: Uuid,
        visibility: Visibility,
    ) -> Result<ProcessingOutcome> {
        self.processor.run(upload_id, visibility).await
    }

    pub async fn get_upload(&self, upload_id: Uuid) -> Result<RawUpload> {
        self.store
            .get_upload(upload_id)
            .await?
            .ok_or(EtlError::NotFound {
                entity: "upload",
                id: upload_id,
            })
    }

    /// The generated report of a COMPLETED upload
    pub async fn download_report(&self, upload_id: Uuid) -> Result<ReportArtifact> {
        let upload = self.get_upload(upload_id).await?;
        if !upload.is_completed() {
            return Err(EtlError::InvalidState(NOT_YET_PROCESSED.to_string()));
        }
        upload
            .output
            .ok_or_else(|| EtlError::InvalidState(NOT_YET_PROCESSED.to_string()))
    }

    /// Uploads, newest first, optionally restricted to one status
    pub async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<RawUpload>> {
        self.store.list_uploads(status).await
    }
}
