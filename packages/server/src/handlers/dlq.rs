use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sea_orm::TransactionTrait;
use tracing::{error, info, instrument, warn};

use crate::dlq::{DlqService, ResolveResult, dlq_service};
use crate::error::{AppError, ErrorBody};
use crate::models::dlq::*;
use crate::models::shared::Pagination;
use crate::state::AppState;

fn missing(id: i32) -> AppError {
    AppError::NotFound(format!("No dead letter with id {id}"))
}

/// Dead-lettered derivation jobs, newest first.
#[utoipa::path(
    get,
    path = "/dlq",
    tag = "Dead Letter Queue",
    operation_id = "listDlqMessages",
    summary = "List dead letters",
    description = "Pages through derivation jobs that failed permanently, newest first. \
        Filter by `resolved` and `error_code`.",
    params(ListDlqParams),
    responses(
        (status = 200, description = "One page of dead letters", body = DlqListResponse),
    ),
)]
#[instrument(skip(state))]
pub async fn list_dlq_messages(
    State(state): State<AppState>,
    Query(params): Query<ListDlqParams>,
) -> Result<Json<DlqListResponse>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let (messages, total) = dlq_service(&state.db)
        .list(params.resolved, params.error_code.as_deref(), page, per_page)
        .await?;

    Ok(Json(DlqListResponse {
        data: messages.into_iter().map(Into::into).collect(),
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        },
    }))
}

/// One dead letter with its payload and retry history.
#[utoipa::path(
    get,
    path = "/dlq/{id}",
    tag = "Dead Letter Queue",
    operation_id = "getDlqMessage",
    summary = "Get a dead letter",
    params(("id" = i32, Path, description = "Dead letter id")),
    responses(
        (status = 200, description = "Dead letter", body = DlqMessageDetailResponse),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_dlq_message(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DlqMessageDetailResponse>, AppError> {
    let message = dlq_service(&state.db)
        .get_by_id(id)
        .await?
        .ok_or_else(|| missing(id))?;

    Ok(Json(message.into()))
}

/// Publish the dead letter's image id to the jobs queue again and mark it
/// resolved, inside one transaction holding the row lock.
#[utoipa::path(
    post,
    path = "/dlq/{id}/retry",
    tag = "Dead Letter Queue",
    operation_id = "retryDlqMessage",
    summary = "Requeue a dead letter",
    description = "Publishes the message's image id to the jobs queue again and marks the entry \
        resolved. Messages whose job body was not an image id cannot be retried.",
    params(("id" = i32, Path, description = "Dead letter id")),
    responses(
        (status = 200, description = "Message requeued", body = DlqRetryResponse),
        (status = 400, description = "Image id unknown (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Message already resolved (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Queue unavailable (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn retry_dlq_message(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DlqRetryResponse>, AppError> {
    let txn = state.db.begin().await?;
    let dlq = DlqService::new(&txn);

    let message = dlq
        .get_by_id_for_update(id)
        .await?
        .ok_or_else(|| missing(id))?;

    if message.resolved {
        return Err(AppError::Conflict("Message already resolved".into()));
    }

    let Some(image_id) = message.image_id else {
        return Err(AppError::Validation(
            "Cannot retry: the job body was not an image id".into(),
        ));
    };

    match dlq.resolve(id).await? {
        ResolveResult::Resolved => {}
        ResolveResult::AlreadyResolved => {
            warn!(id, "Resolved by another request mid-retry");
        }
        ResolveResult::NotFound => {
            return Err(AppError::Internal(
                format!("Dead letter {id} vanished mid-retry"),
            ));
        }
    }

    state
        .queue
        .publish(&state.config.mq.queue_name, &image_id.to_string())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to re-enqueue job: {e}")))?;

    txn.commit().await.map_err(|e| {
        error!(
            id,
            %image_id,
            error = %e,
            "Job republished but DB commit failed; DLQ entry remains unresolved"
        );
        AppError::Internal(format!("DB commit failed after publish: {e}"))
    })?;

    info!(id, %image_id, "DLQ message retried");

    Ok(Json(DlqRetryResponse {
        message: format!("Derivation requeued for image {image_id}"),
    }))
}

/// Mark a dead letter resolved without requeueing it.
#[utoipa::path(
    delete,
    path = "/dlq/{id}",
    tag = "Dead Letter Queue",
    operation_id = "deleteDlqMessage",
    summary = "Dismiss a dead letter",
    params(("id" = i32, Path, description = "Dead letter id")),
    responses(
        (status = 204, description = "Dismissed, or already resolved"),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_dlq_message(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = dlq_service(&state.db).resolve(id).await?;
    if outcome == ResolveResult::NotFound {
        return Err(missing(id));
    }
    info!(id, already = outcome == ResolveResult::AlreadyResolved, "Dead letter dismissed");
    Ok(StatusCode::NO_CONTENT)
}
