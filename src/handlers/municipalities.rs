//! Municipality reference data

use crate::error::ApiError;
use crate::models::{Municipality, MunicipalityInput, PageRequest};
use crate::validation::ValidationError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};

use super::{check_body_id, log_audit, paginated, AppState, Caller};

fn validate_input(input: &MunicipalityInput) -> Result<(), ValidationError> {
    if input.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if input.name.chars().count() > 255 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 255,
        });
    }
    Ok(())
}

pub async fn list_municipalities(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ApiError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM municipalities")
        .fetch_one(&state.pool)
        .await?;

    let items = sqlx::query_as::<_, Municipality>(
        "SELECT * FROM municipalities ORDER BY name, id LIMIT $1 OFFSET $2",
    )
    .bind(page.size())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(paginated(items, total))
}

pub async fn get_municipality(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Municipality>, ApiError> {
    sqlx::query_as::<_, Municipality>("SELECT * FROM municipalities WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Municipality"))
}

pub async fn create_municipality(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<MunicipalityInput>,
) -> Result<(StatusCode, Json<Municipality>), ApiError> {
    caller.require_admin()?;
    if input.id.is_some() {
        return Err(ApiError::BadRequest(
            "A new municipality cannot already have an id".to_string(),
        ));
    }
    validate_input(&input)?;

    let municipality = sqlx::query_as::<_, Municipality>(
        "INSERT INTO municipalities (name, region, country) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(input.name.trim())
    .bind(&input.region)
    .bind(&input.country)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "municipality_changed",
        "municipality",
        Some(municipality.id),
        Some(caller.id()),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(municipality)))
}

pub async fn update_municipality(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(input): Json<MunicipalityInput>,
) -> Result<Json<Municipality>, ApiError> {
    caller.require_admin()?;
    check_body_id(id, input.id)?;
    validate_input(&input)?;

    let municipality = sqlx::query_as::<_, Municipality>(
        "UPDATE municipalities SET name = $1, region = $2, country = $3 WHERE id = $4 RETURNING *",
    )
    .bind(input.name.trim())
    .bind(&input.region)
    .bind(&input.country)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("Municipality"))?;

    log_audit(
        &state.pool,
        "municipality_changed",
        "municipality",
        Some(id),
        Some(caller.id()),
        None,
    )
    .await;

    Ok(Json(municipality))
}

pub async fn delete_municipality(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    caller.require_admin()?;

    let result = sqlx::query("DELETE FROM municipalities WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Municipality"));
    }

    log_audit(
        &state.pool,
        "municipality_changed",
        "municipality",
        Some(id),
        Some(caller.id()),
        Some(serde_json::json!({ "deleted": true })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
