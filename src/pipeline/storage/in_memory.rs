use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::lock;
use super::traits::{validate_indicator, CatalogStore};
use crate::domain::{Category, DataModel, Indicator, RawUpload, UploadStatus};
use crate::error::{EtlError, Result};

/// In-memory storage implementation for development/testing
#[derive(Clone)]
pub struct InMemoryStore {
    categories: Arc<Mutex<HashMap<Uuid, Category>>>,
    data_models: Arc<Mutex<HashMap<String, DataModel>>>,
    indicators: Arc<Mutex<HashMap<Uuid, Indicator>>>,
    uploads: Arc<Mutex<HashMap<Uuid, RawUpload>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            categories: Arc::new(Mutex::new(HashMap::new())),
            data_models: Arc::new(Mutex::new(HashMap::new())),
            indicators: Arc::new(Mutex::new(HashMap::new())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_category(&self, category: &mut Category) -> Result<()> {
        let mut categories = lock(&self.categories)?;
        if categories
            .values()
            .any(|c| c.name.to_lowercase() == category.name.to_lowercase())
        {
            return Err(EtlError::storage(format!(
                "category '{}' already exists",
                category.name
            )));
        }

        let id = Uuid::new_v4();
        category.id = Some(id);
        categories.insert(id, category.clone());

        debug!("Created category: {} with id {}", category.name, id);
        Ok(())
    }

    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>> {
        let categories = lock(&self.categories)?;
        Ok(categories.get(&category_id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories = lock(&self.categories)?;
        let mut all: Vec<Category> = categories.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_or_create_data_model(
        &self,
        name: &str,
        description: &str,
    ) -> Result<(DataModel, bool)> {
        // Lookup and insert happen under one guard
        let mut models = lock(&self.data_models)?;
        if let Some(existing) = models.get(name) {
            return Ok((existing.clone(), false));
        }

        let model = DataModel {
            id: Some(Uuid::new_v4()),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        models.insert(name.to_string(), model.clone());

        debug!("Created data model: {}", name);
        Ok((model, true))
    }

    async fn list_data_models(&self) -> Result<Vec<DataModel>> {
        let models = lock(&self.data_models)?;
        let mut all: Vec<DataModel> = models.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_indicator(&self, indicator: &mut Indicator) -> Result<()> {
        validate_indicator(indicator)?;
        if !lock(&self.categories)?.contains_key(&indicator.category_id) {
            return Err(EtlError::NotFound {
                entity: "category",
                id: indicator.category_id,
            });
        }

        let id = Uuid::new_v4();
        indicator.id = Some(id);

        let mut indicators = lock(&self.indicators)?;
        indicators.insert(id, indicator.clone());

        debug!("Created indicator: {} with id {}", indicator.title, id);
        Ok(())
    }

    async fn get_indicator(&self, indicator_id: Uuid) -> Result<Option<Indicator>> {
        let indicators = lock(&self.indicators)?;
        Ok(indicators.get(&indicator_id).cloned())
    }

    async fn get_indicators_by_category(&self, category_id: Uuid) -> Result<Vec<Indicator>> {
        let indicators = lock(&self.indicators)?;
        let mut found: Vec<Indicator> = indicators
            .values()
            .filter(|i| i.category_id == category_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn create_upload(&self, upload: &mut RawUpload) -> Result<()> {
        let id = Uuid::new_v4();
        upload.id = Some(id);

        let mut uploads = lock(&self.uploads)?;
        uploads.insert(id, upload.clone());

        debug!("Created upload: {} with id {}", upload.file.name, id);
        Ok(())
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<RawUpload>> {
        let uploads = lock(&self.uploads)?;
        Ok(uploads.get(&upload_id).cloned())
    }

    async fn update_upload(&self, upload: &RawUpload) -> Result<()> {
        let upload_id = upload
            .id
            .ok_or_else(|| EtlError::storage("Cannot update upload without ID"))?;

        let mut uploads = lock(&self.uploads)?;
        if !uploads.contains_key(&upload_id) {
            return Err(EtlError::NotFound {
                entity: "upload",
                id: upload_id,
            });
        }
        uploads.insert(upload_id, upload.clone());

        debug!("Updated upload {} to {}", upload_id, upload.status);
        Ok(())
    }

    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<RawUpload>> {
        let uploads = lock(&self.uploads)?;
        let mut found: Vec<RawUpload> = uploads
            .values()
            .filter(|u| status.map_or(true, |s| u.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(found)
    }
}
