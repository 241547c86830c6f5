//! Citizen documents (identity papers and the like kept on file)

use crate::error::ApiError;
use crate::models::{CitizenDocument, DocumentDto, PageRequest};
use crate::validation::ValidationError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use base64::Engine;
use sqlx::PgPool;

use super::{check_body_id, log_audit, paginated, AppState, Caller};

/// Owner filter for the caller: `None` means staff, who see every document
fn owner_filter(caller: &Caller) -> Option<i64> {
    (!caller.role.is_staff()).then(|| caller.id())
}

fn decode_file(encoded: Option<&str>) -> Result<Option<Vec<u8>>, ApiError> {
    encoded
        .map(|data| {
            base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| ApiError::BadRequest(format!("file is not valid base64: {}", e)))
        })
        .transpose()
}

fn validate_input(input: &DocumentDto) -> Result<(), ValidationError> {
    for (field, value, max) in [
        ("title", input.title.as_str(), 255),
        ("type", input.doc_type.as_str(), 100),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
        if value.chars().count() > max {
            return Err(ValidationError::TooLong {
                field: field.to_string(),
                max,
            });
        }
    }
    Ok(())
}

async fn load_document(pool: &PgPool, caller: &Caller, id: i64) -> Result<CitizenDocument, ApiError> {
    let doc = sqlx::query_as::<_, CitizenDocument>("SELECT * FROM documents WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Document"))?;

    match owner_filter(caller) {
        Some(owner) if doc.citizen_id != Some(owner) => Err(ApiError::NotFound("Document")),
        _ => Ok(doc),
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ApiError> {
    let owner = owner_filter(&caller);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE $1::BIGINT IS NULL OR citizen_id = $1",
    )
    .bind(owner)
    .fetch_one(&state.pool)
    .await?;

    let docs = sqlx::query_as::<_, CitizenDocument>(
        r#"
        SELECT * FROM documents
        WHERE $1::BIGINT IS NULL OR citizen_id = $1
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner)
    .bind(page.size())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(paginated(
        docs.into_iter().map(DocumentDto::from).collect(),
        total,
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentDto>, ApiError> {
    let doc = load_document(&state.pool, &caller, id).await?;
    Ok(Json(DocumentDto::from(doc)))
}

pub async fn create_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<DocumentDto>,
) -> Result<(StatusCode, Json<DocumentDto>), ApiError> {
    if input.id.is_some() {
        return Err(ApiError::BadRequest(
            "A new document cannot already have an id".to_string(),
        ));
    }
    validate_input(&input)?;
    let file = decode_file(input.file.as_deref())?;
    let citizen_id = owner_filter(&caller).or(input.citizen_id);

    let doc = sqlx::query_as::<_, CitizenDocument>(
        r#"
        INSERT INTO documents (title, doc_type, issue_date, file, file_content_type, citizen_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(input.title.trim())
    .bind(input.doc_type.trim())
    .bind(input.issue_date)
    .bind(file)
    .bind(&input.file_content_type)
    .bind(citizen_id)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "document_changed",
        "document",
        Some(doc.id),
        Some(caller.id()),
        Some(serde_json::json!({ "created": true })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(DocumentDto::from(doc))))
}

pub async fn update_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(input): Json<DocumentDto>,
) -> Result<Json<DocumentDto>, ApiError> {
    check_body_id(id, input.id)?;
    validate_input(&input)?;
    let current = load_document(&state.pool, &caller, id).await?;
    let file = decode_file(input.file.as_deref())?;

    // Citizens cannot hand a document over to someone else
    let citizen_id = if caller.role.is_staff() {
        input.citizen_id
    } else {
        current.citizen_id
    };

    let doc = sqlx::query_as::<_, CitizenDocument>(
        r#"
        UPDATE documents
        SET title = $1, doc_type = $2, issue_date = $3, file = $4,
            file_content_type = $5, citizen_id = $6
        WHERE id = $7
        RETURNING *
        "#,
    )
    .bind(input.title.trim())
    .bind(input.doc_type.trim())
    .bind(input.issue_date)
    .bind(file)
    .bind(&input.file_content_type)
    .bind(citizen_id)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "document_changed",
        "document",
        Some(id),
        Some(caller.id()),
        None,
    )
    .await;

    Ok(Json(DocumentDto::from(doc)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    load_document(&state.pool, &caller, id).await?;

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_audit(
        &state.pool,
        "document_changed",
        "document",
        Some(id),
        Some(caller.id()),
        Some(serde_json::json!({ "deleted": true })),
    )
    .await;
    tracing::info!("User {} deleted document {}", caller.id(), id);

    Ok(StatusCode::NO_CONTENT)
}
