use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A dead-lettered derivation job awaiting operator attention.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dead_letter_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub message_id: String,

    #[sea_orm(indexed)]
    pub message_type: String,

    #[sea_orm(indexed)]
    pub image_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub payload: String,

    #[sea_orm(indexed)]
    pub error_code: String,

    #[sea_orm(column_type = "Text")]
    pub error_message: String,

    pub retry_count: i32,

    /// `[{attempt, error, timestamp}]`
    #[sea_orm(column_type = "JsonBinary")]
    pub retry_history: Json,

    pub first_failed_at: DateTimeUtc,

    pub created_at: DateTimeUtc,

    #[sea_orm(default_value = false, indexed)]
    pub resolved: bool,

    pub resolved_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
