use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::variant::{ImageContentType, Variant};

/// An uploaded original or one of its derived renditions.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "image_file")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub filename: String,

    pub content_type: ImageContentType,

    #[sea_orm(indexed)]
    pub owner_id: String,

    /// Null for originals.
    pub variant: Option<Variant>,

    /// Null for originals; the original's id for renditions.
    #[sea_orm(indexed)]
    pub source_id: Option<Uuid>,

    /// Hex SHA-256 of the stored bytes.
    pub content_hash: String,

    pub size_bytes: Option<i64>,

    pub width: Option<i32>,

    pub height: Option<i32>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
