use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

use super::{
    CatalogError, ImageCatalog, ImageRecord, MediaKey, NewImageRecord, SourceMetadata,
};
use crate::entity::image_file;
use crate::storage::ContentHash;

/// Catalog backed by the `image_file` table.
#[derive(Clone)]
pub struct SeaOrmCatalog {
    db: DatabaseConnection,
}

impl SeaOrmCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<ImageRecord>, CatalogError> {
        image_file::Entity::find()
            .filter(image_file::Column::Filename.eq(filename))
            .one(&self.db)
            .await?
            .map(ImageRecord::try_from)
            .transpose()
    }
}

impl From<DbErr> for CatalogError {
    fn from(err: DbErr) -> Self {
        Self::Backend(err.to_string())
    }
}

fn dimension(value: Option<u32>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

impl From<NewImageRecord> for image_file::ActiveModel {
    fn from(record: NewImageRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Set(record.id),
            filename: Set(record.filename),
            content_type: Set(record.content_type),
            owner_id: Set(record.owner_id),
            variant: Set(record.variant),
            source_id: Set(record.source_id),
            content_hash: Set(record.content_hash.to_hex()),
            size_bytes: Set(record.size_bytes),
            width: Set(dimension(record.width)),
            height: Set(dimension(record.height)),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}

impl TryFrom<image_file::Model> for ImageRecord {
    type Error = CatalogError;

    fn try_from(model: image_file::Model) -> Result<Self, Self::Error> {
        let content_hash =
            ContentHash::from_hex(&model.content_hash).map_err(|e| CatalogError::Corrupt {
                id: model.id,
                reason: e.to_string(),
            })?;
        Ok(Self {
            id: model.id,
            filename: model.filename,
            content_type: model.content_type,
            owner_id: model.owner_id,
            variant: model.variant,
            source_id: model.source_id,
            content_hash,
            size_bytes: model.size_bytes,
            width: model.width.and_then(|v| u32::try_from(v).ok()),
            height: model.height.and_then(|v| u32::try_from(v).ok()),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[async_trait]
impl ImageCatalog for SeaOrmCatalog {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError> {
        let filename = record.filename.clone();
        match image_file::ActiveModel::from(record).insert(&self.db).await {
            Ok(model) => ImageRecord::try_from(model),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(CatalogError::FilenameTaken(filename))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_rendition(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError> {
        let filename = record.filename.clone();
        image_file::Entity::insert(image_file::ActiveModel::from(record))
            .on_conflict(
                OnConflict::column(image_file::Column::Filename)
                    .update_columns([
                        image_file::Column::ContentType,
                        image_file::Column::ContentHash,
                        image_file::Column::SizeBytes,
                        image_file::Column::Width,
                        image_file::Column::Height,
                        image_file::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.find_by_filename(&filename)
            .await?
            .ok_or_else(|| CatalogError::Backend(format!("{filename} missing after upsert")))
    }

    async fn find(&self, key: &MediaKey) -> Result<Option<ImageRecord>, CatalogError> {
        match key {
            MediaKey::Id(id) => image_file::Entity::find_by_id(*id)
                .one(&self.db)
                .await?
                .map(ImageRecord::try_from)
                .transpose(),
            MediaKey::Filename(name) => self.find_by_filename(name).await,
        }
    }

    async fn update_source_metadata(
        &self,
        id: Uuid,
        meta: SourceMetadata,
    ) -> Result<bool, CatalogError> {
        let result = image_file::Entity::update_many()
            .col_expr(image_file::Column::SizeBytes, Expr::value(meta.size_bytes))
            .col_expr(image_file::Column::Width, Expr::value(dimension(Some(meta.width))))
            .col_expr(image_file::Column::Height, Expr::value(dimension(Some(meta.height))))
            .col_expr(image_file::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(image_file::Column::Id.eq(id))
            .filter(image_file::Column::SourceId.is_null())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn renditions_of(&self, source_id: Uuid) -> Result<Vec<ImageRecord>, CatalogError> {
        let models = image_file::Entity::find()
            .filter(image_file::Column::SourceId.eq(source_id))
            .order_by_asc(image_file::Column::CreatedAt)
            .all(&self.db)
            .await?;
        let mut records = models
            .into_iter()
            .map(ImageRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.variant);
        Ok(records)
    }
}
