use chrono::Utc;
use common::{DERIVATION_JOB, DlqEnvelope};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};

use common::entity::dead_letter_message;

/// Result of attempting to resolve a DLQ message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveResult {
    /// Message was successfully resolved.
    Resolved,
    /// Message was not found.
    NotFound,
    /// Message was already resolved.
    AlreadyResolved,
}

pub struct DlqService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DlqService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a dead-lettered job. Redelivery of the same envelope returns
    /// the existing row.
    pub async fn record(&self, envelope: &DlqEnvelope) -> Result<dead_letter_message::Model, DbErr> {
        let now = Utc::now();
        let first_failed_at = envelope
            .retry_history
            .first()
            .map(|r| r.timestamp)
            .unwrap_or(now);
        let retry_history = serde_json::to_value(&envelope.retry_history)
            .map_err(|e| DbErr::Custom(format!("Unserializable retry history: {e}")))?;

        let model = dead_letter_message::ActiveModel {
            message_id: Set(envelope.message_id.clone()),
            message_type: Set(DERIVATION_JOB.to_string()),
            image_id: Set(envelope.image_id),
            payload: Set(envelope.payload.clone()),
            error_code: Set(envelope.error_code.to_string()),
            error_message: Set(envelope.error_message.clone()),
            retry_count: Set(envelope.retry_history.len() as i32),
            retry_history: Set(retry_history),
            first_failed_at: Set(first_failed_at),
            created_at: Set(now),
            resolved: Set(false),
            resolved_at: Set(None),
            ..Default::default()
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                dead_letter_message::Entity::find()
                    .filter(dead_letter_message::Column::MessageId.eq(envelope.message_id.as_str()))
                    .one(self.conn)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(
                            "UniqueConstraintViolation but existing row not found".to_string(),
                        )
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// List DLQ messages, newest first.
    pub async fn list(
        &self,
        resolved: Option<bool>,
        error_code: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<dead_letter_message::Model>, u64), DbErr> {
        let mut query = dead_letter_message::Entity::find();

        if let Some(res) = resolved {
            query = query.filter(dead_letter_message::Column::Resolved.eq(res));
        }
        if let Some(code) = error_code {
            query = query.filter(dead_letter_message::Column::ErrorCode.eq(code));
        }

        let total = query.clone().count(self.conn).await?;

        let messages = query
            .order_by_desc(dead_letter_message::Column::CreatedAt)
            .offset(page.saturating_sub(1) * per_page)
            .limit(per_page)
            .all(self.conn)
            .await?;

        Ok((messages, total))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<dead_letter_message::Model>, DbErr> {
        dead_letter_message::Entity::find_by_id(id)
            .one(self.conn)
            .await
    }

    /// Get a single DLQ message by ID with FOR UPDATE lock.
    pub async fn get_by_id_for_update(
        &self,
        id: i32,
    ) -> Result<Option<dead_letter_message::Model>, DbErr> {
        dead_letter_message::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(self.conn)
            .await
    }

    /// Mark a message as resolved.
    pub async fn resolve(&self, id: i32) -> Result<ResolveResult, DbErr> {
        let updated = dead_letter_message::Entity::update_many()
            .col_expr(dead_letter_message::Column::Resolved, Expr::value(true))
            .col_expr(dead_letter_message::Column::ResolvedAt, Expr::value(Utc::now()))
            .filter(dead_letter_message::Column::Id.eq(id))
            .filter(dead_letter_message::Column::Resolved.eq(false))
            .exec(self.conn)
            .await?;

        if updated.rows_affected > 0 {
            return Ok(ResolveResult::Resolved);
        }

        let exists = dead_letter_message::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .is_some();

        if exists {
            Ok(ResolveResult::AlreadyResolved)
        } else {
            Ok(ResolveResult::NotFound)
        }
    }
}

/// Create a DlqService with a DatabaseConnection.
pub fn dlq_service(db: &DatabaseConnection) -> DlqService<'_, DatabaseConnection> {
    DlqService::new(db)
}
