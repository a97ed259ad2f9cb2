use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::{RawUpload, ReportArtifact, UploadStatus, Visibility};
use crate::error::{EtlError, Result};
use crate::observability;
use crate::pipeline::cleaner::Cleaner;
use crate::pipeline::mapper::ColumnMapper;
use crate::pipeline::materializer::{IndicatorMaterializer, MaterializeContext};
use crate::pipeline::reader::TabularReader;
use crate::pipeline::report::ReportGenerator;
use crate::pipeline::storage::CatalogStore;
use crate::pipeline::validator::Validator;

pub const MISSING_CATEGORY: &str = "Aucune catégorie sélectionnée pour ce fichier";

/// Result of one pipeline run as seen by the caller
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub success: bool,
    pub upload_id: Uuid,
    pub status: UploadStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub failed_rows: usize,
    pub message: String,
    #[serde(skip)]
    pub output: Option<ReportArtifact>,
}

impl ProcessingOutcome {
    fn from_upload(upload: &RawUpload, upload_id: Uuid) -> Self {
        let success = upload.is_completed();
        let message = if success {
            upload.report.clone().unwrap_or_default()
        } else {
            upload.error_message.clone().unwrap_or_default()
        };
        Self {
            success,
            upload_id,
            status: upload.status,
            total_rows: upload.total_rows,
            processed_rows: upload.processed_rows,
            failed_rows: upload.failed_rows,
            message,
            output: upload.output.clone(),
        }
    }
}

/// Drives an upload through read, clean, validate, map, materialize and report,
/// and owns every status and counter change on the upload row.
pub struct UploadProcessor {
    store: Arc<dyn CatalogStore>,
    materializer: IndicatorMaterializer,
}

impl UploadProcessor {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            materializer: IndicatorMaterializer::new(store.clone()),
            store,
        }
    }

    /// Start a PENDING upload and run it to a terminal status.
    ///
    /// Errors only when the run cannot start: unknown upload, an upload that
    /// is not PENDING, or one without a category. Once started, pipeline
    /// failures are recorded on the upload and returned as a failed outcome.
    pub async fn run(&self, upload_id: Uuid, visibility: Visibility) -> Result<ProcessingOutcome> {
        let mut upload = self
            .store
            .get_upload(upload_id)
            .await?
            .ok_or(EtlError::NotFound {
                entity: "upload",
                id: upload_id,
            })?;

        if !upload.is_pending() {
            observability::upload_rejected("not_pending");
            return Err(EtlError::InvalidState(format!(
                "Fichier déjà {}",
                upload.status.label()
            )));
        }
        if upload.category_id.is_none() {
            observability::upload_rejected("missing_category");
            return Err(EtlError::InvalidState(MISSING_CATEGORY.to_string()));
        }

        upload.status = UploadStatus::Processing;
        upload.processing_started_at = Some(Utc::now());
        self.store.update_upload(&upload).await?;

        Ok(self.process(&mut upload, upload_id, visibility).await)
    }

    #[instrument(skip(self, upload), fields(file = %upload.file.name, format = %upload.file_format))]
    async fn process(
        &self,
        upload: &mut RawUpload,
        upload_id: Uuid,
        visibility: Visibility,
    ) -> ProcessingOutcome {
        let started = Instant::now();

        match self.execute(upload, upload_id, visibility).await {
            Ok(()) => {
                upload.status = UploadStatus::Completed;
                upload.report = Some(format!(
                    "Traitement complété: {} indicateurs créés",
                    upload.processed_rows
                ));
                info!(
                    total = upload.total_rows,
                    processed = upload.processed_rows,
                    failed = upload.failed_rows,
                    "Upload completed"
                );
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                upload.status = UploadStatus::Failed;
                upload.error_message = Some(e.to_string());
            }
        }
        upload.processing_completed_at = Some(Utc::now());

        if let Err(e) = self.store.update_upload(upload).await {
            error!("Could not persist upload outcome: {}", e);
            upload.status = UploadStatus::Failed;
            upload.error_message = Some(e.to_string());
            upload.output = None;
        }

        observability::upload_finished(upload.status, started.elapsed().as_secs_f64());
        ProcessingOutcome::from_upload(upload, upload_id)
    }

    async fn execute(
        &self,
        upload: &mut RawUpload,
        upload_id: Uuid,
        visibility: Visibility,
    ) -> Result<()> {
        let category_id = upload
            .category_id
            .ok_or_else(|| EtlError::InvalidState(MISSING_CATEGORY.to_string()))?;
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or(EtlError::NotFound {
                entity: "category",
                id: category_id,
            })?;

        let raw = TabularReader::read_as(&upload.file.bytes, upload.file_format)?;
        let table = Cleaner::clean(raw);
        Validator::validate(&table).into_result()?;

        let mapping = ColumnMapper::map(&table.columns);
        info!(
            title = ?mapping.title.as_ref().map(|c| &c.name),
            description = ?mapping.description.as_ref().map(|c| &c.name),
            "Resolved columns"
        );

        let ctx = MaterializeContext {
            category: &category,
            visibility,
            uploaded_by: upload.uploaded_by.clone(),
            batch_started_at: upload.processing_started_at.unwrap_or_else(Utc::now),
        };
        let outcome = self.materializer.materialize(&table, &mapping, &ctx).await?;

        upload.total_rows = table.row_count();
        upload.processed_rows = outcome.created_count();
        upload.failed_rows = upload.total_rows - upload.processed_rows;
        observability::rows_recorded(upload.processed_rows, upload.failed_rows);

        let artifact = ReportGenerator::generate(upload_id, &category, &outcome.created)?;
        upload.output = Some(artifact);
        Ok(())
    }
}
