//! Request attachment upload and download

use crate::attachments::{self, sanitize_filename};
use crate::error::ApiError;
use crate::models::{AttachmentDto, RequestAttachment};
use crate::validation::{validate_file_upload, validate_filename_extensions};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Extension, Json,
};
use tokio::fs;

use super::requests::load_visible;
use super::{log_audit, AppState, Caller};

/// Multipart field carrying the file
const FILE_FIELD: &str = "file";

/// `GET /api/requests/{id}/attachments`, in upload order
pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
) -> Result<Json<Vec<AttachmentDto>>, ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;

    let rows = sqlx::query_as::<_, RequestAttachment>(
        "SELECT * FROM request_attachments WHERE request_id = $1 ORDER BY uploaded_date, id",
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| attachments::to_dto(row, &state.public_base_url))
            .collect(),
    ))
}

/// `POST /api/requests/{id}/attachments` (multipart, field `file`)
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AttachmentDto>), ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Multipart parsing error: {}", e);
        ApiError::BadRequest(format!("Invalid upload: {}", e))
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("file").to_string();
        let declared_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read uploaded file: {}", e);
            ApiError::BadRequest(format!("Failed to read uploaded file: {}", e))
        })?;
        upload = Some((filename, declared_type, data));
        break;
    }

    let Some((original_filename, declared_type, data)) = upload else {
        return Err(ApiError::BadRequest(format!(
            "No '{}' field in upload",
            FILE_FIELD
        )));
    };

    validate_filename_extensions(&original_filename)?;
    let content_type = validate_file_upload(&declared_type, &data, state.max_upload_size)?;

    let stored = attachments::stored_filename(&original_filename);
    let dir = attachments::request_dir(&state.upload_dir, request_id);
    let file_path = attachments::storage_path(&state.upload_dir, request_id, &stored)
        .ok_or_else(|| ApiError::BadRequest("Invalid filename".to_string()))?;

    fs::create_dir_all(&dir).await.map_err(|e| {
        ApiError::Internal(format!("Failed to create upload directory {:?}: {}", dir, e))
    })?;
    fs::write(&file_path, &data).await.map_err(|e| {
        ApiError::Internal(format!("Failed to write file {:?}: {}", file_path, e))
    })?;

    let inserted = sqlx::query_as::<_, RequestAttachment>(
        r#"
        INSERT INTO request_attachments
            (request_id, filename, stored_filename, file_path, content_type, file_size)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(sanitize_filename(&original_filename))
    .bind(&stored)
    .bind(file_path.to_string_lossy().to_string())
    .bind(&content_type)
    .bind(data.len() as i64)
    .fetch_one(&state.pool)
    .await;

    let attachment = match inserted {
        Ok(attachment) => attachment,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&file_path).await {
                tracing::warn!("Failed to remove orphaned file {:?}: {}", file_path, cleanup);
            }
            return Err(e.into());
        }
    };

    log_audit(
        &state.pool,
        "attachment_uploaded",
        "request",
        Some(request_id),
        Some(caller.id()),
        Some(serde_json::json!({
            "attachment_id": attachment.id,
            "filename": attachment.filename,
            "size": attachment.file_size,
        })),
    )
    .await;
    tracing::info!(
        "User {} attached {} ({} bytes) to request {}",
        caller.id(),
        attachment.filename,
        attachment.file_size,
        request_id
    );

    Ok((
        StatusCode::CREATED,
        Json(attachments::to_dto(attachment, &state.public_base_url)),
    ))
}

/// `GET /api/requests/{id}/attachments/{attachment_id}/content`
pub async fn download_attachment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((request_id, attachment_id)): Path<(i64, i64)>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;

    let attachment = sqlx::query_as::<_, RequestAttachment>(
        "SELECT * FROM request_attachments WHERE id = $1 AND request_id = $2",
    )
    .bind(attachment_id)
    .bind(request_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("Attachment"))?;

    let path = attachments::storage_path(&state.upload_dir, request_id, &attachment.stored_filename)
        .ok_or(ApiError::NotFound("Attachment"))?;
    let bytes = fs::read(&path).await.map_err(|e| {
        tracing::error!("Stored attachment {:?} unreadable: {}", path, e);
        ApiError::NotFound("Attachment")
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&attachment.content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", attachment.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((headers, bytes))
}
