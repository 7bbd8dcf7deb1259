use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CatalogError, ImageCatalog, ImageRecord, MediaKey, NewImageRecord, SourceMetadata,
};

#[derive(Default)]
struct Tables {
    by_id: HashMap<Uuid, ImageRecord>,
    by_filename: HashMap<String, Uuid>,
}

/// Process-local catalog. Used by tests and single-process setups.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ImageCatalog for MemoryCatalog {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError> {
        let mut tables = self.tables.write().await;
        if tables.by_filename.contains_key(&record.filename) {
            return Err(CatalogError::FilenameTaken(record.filename));
        }
        let record = record.into_record(Utc::now());
        tables.by_filename.insert(record.filename.clone(), record.id);
        tables.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    async fn upsert_rendition(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let existing = tables.by_filename.get(&record.filename).copied();
        let Some(existing_id) = existing else {
            let record = record.into_record(now);
            tables.by_filename.insert(record.filename.clone(), record.id);
            tables.by_id.insert(record.id, record.clone());
            return Ok(record);
        };

        let stored = tables
            .by_id
            .get_mut(&existing_id)
            .ok_or_else(|| CatalogError::Corrupt {
                id: existing_id,
                reason: "filename index points at a missing record".into(),
            })?;
        stored.content_type = record.content_type;
        stored.owner_id = record.owner_id;
        stored.variant = record.variant;
        stored.source_id = record.source_id;
        stored.content_hash = record.content_hash;
        stored.size_bytes = record.size_bytes;
        stored.width = record.width;
        stored.height = record.height;
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn find(&self, key: &MediaKey) -> Result<Option<ImageRecord>, CatalogError> {
        let tables = self.tables.read().await;
        let id = match key {
            MediaKey::Id(id) => Some(*id),
            MediaKey::Filename(name) => tables.by_filename.get(name).copied(),
        };
        Ok(id.and_then(|id| tables.by_id.get(&id).cloned()))
    }

    async fn update_source_metadata(
        &self,
        id: Uuid,
        meta: SourceMetadata,
    ) -> Result<bool, CatalogError> {
        let mut tables = self.tables.write().await;
        match tables.by_id.get_mut(&id) {
            Some(record) if record.is_original() => {
                record.size_bytes = Some(meta.size_bytes);
                record.width = Some(meta.width);
                record.height = Some(meta.height);
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renditions_of(&self, source_id: Uuid) -> Result<Vec<ImageRecord>, CatalogError> {
        let tables = self.tables.read().await;
        let mut found: Vec<ImageRecord> = tables
            .by_id
            .values()
            .filter(|r| r.source_id == Some(source_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.variant);
        Ok(found)
    }
}
