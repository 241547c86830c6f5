//! Request conversation thread

use crate::error::ApiError;
use crate::models::{CreateMessage, RequestMessage};
use crate::validation::validate_message_content;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::requests::load_visible;
use super::{log_audit, AppState, Caller};

/// `GET /api/requests/{id}/messages`, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
) -> Result<Json<Vec<RequestMessage>>, ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;

    let messages = sqlx::query_as::<_, RequestMessage>(
        r#"
        SELECT id, request_id, author, content, created_date
        FROM request_messages
        WHERE request_id = $1
        ORDER BY created_date, id
        "#,
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(messages))
}

/// `POST /api/requests/{id}/messages`
pub async fn post_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
    Json(input): Json<CreateMessage>,
) -> Result<(StatusCode, Json<RequestMessage>), ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;
    let content = validate_message_content(&input.content)?;

    let message = sqlx::query_as::<_, RequestMessage>(
        r#"
        INSERT INTO request_messages (request_id, author, content)
        VALUES ($1, $2, $3)
        RETURNING id, request_id, author, content, created_date
        "#,
    )
    .bind(request_id)
    .bind(caller.user.display_name())
    .bind(&content)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "message_posted",
        "request",
        Some(request_id),
        Some(caller.id()),
        Some(serde_json::json!({ "message_id": message.id })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(message)))
}
