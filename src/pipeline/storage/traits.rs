use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Category, DataModel, Indicator, RawUpload, UploadStatus};
use crate::error::{EtlError, Result};
use crate::pipeline::table::MISSING_SENTINEL;

pub const MAX_TITLE_LEN: usize = 255;

/// Storage trait for the catalog and its upload history
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Category operations
    async fn create_category(&self, category: &mut Category) -> Result<()>;
    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>>;
    async fn list_categories(&self) -> Result<Vec<Category>>;

    // Data model operations

    /// Insert-if-absent by name. Returns the stored model and whether this call created it.
    async fn get_or_create_data_model(&self, name: &str, description: &str)
        -> Result<(DataModel, bool)>;
    async fn list_data_models(&self) -> Result<Vec<DataModel>>;

    // Indicator operations
    async fn create_indicator(&self, indicator: &mut Indicator) -> Result<()>;
    async fn get_indicator(&self, indicator_id: Uuid) -> Result<Option<Indicator>>;
    async fn get_indicators_by_category(&self, category_id: Uuid) -> Result<Vec<Indicator>>;

    // Raw upload operations
    async fn create_upload(&self, upload: &mut RawUpload) -> Result<()>;
    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<RawUpload>>;
    async fn update_upload(&self, upload: &RawUpload) -> Result<()>;
    /// Newest first, optionally filtered by status
    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<RawUpload>>;
}

/// Checks every backend applies before persisting an indicator
pub fn validate_indicator(indicator: &Indicator) -> Result<()> {
    let title = indicator.title.trim();
    if title.is_empty() {
        return Err(EtlError::storage("indicator title is empty"));
    }
    if title.eq_ignore_ascii_case(MISSING_SENTINEL) {
        return Err(EtlError::storage("indicator title is a missing value"));
    }
    if indicator.title.chars().count() > MAX_TITLE_LEN {
        return Err(EtlError::storage(format!(
            "indicator title exceeds {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileFormat, Visibility};
    use chrono::Utc;

    fn indicator(title: &str) -> Indicator {
        Indicator {
            id: None,
            title: title.to_string(),
            description: String::new(),
            category_id: Uuid::new_v4(),
            data_model_id: None,
            visibility: Visibility::Private,
            file_format: FileFormat::Excel,
            uploaded_by: None,
            created_at: Utc::now(),
            is_processed: true,
            processing_notes: String::new(),
        }
    }

    #[test]
    fn test_validate_indicator_titles() {
        assert!(validate_indicator(&indicator("Taux de scolarisation")).is_ok());
        assert!(validate_indicator(&indicator("")).is_err());
        assert!(validate_indicator(&indicator("  ")).is_err());
        assert!(validate_indicator(&indicator("NaN")).is_err());
        assert!(validate_indicator(&indicator(&"x".repeat(MAX_TITLE_LEN))).is_ok());
        assert!(validate_indicator(&indicator(&"x".repeat(MAX_TITLE_LEN + 1))).is_err());
    }
}
