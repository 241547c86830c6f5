//! Citizen request handlers

use crate::access::{self, Condition, Listing, RequestFilter, Scope};
use crate::attachments;
use crate::error::ApiError;
use crate::lifecycle;
use crate::models::*;
use crate::validation;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use sqlx::types::Json as SqlJson;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{check_body_id, log_audit, paginated, AppState, Caller};

/// Request columns joined with the owner's contact details
const REQUEST_SELECT: &str = r#"
    SELECT r.id, r.service_type, r.description, r.status, r.form_data,
           r.created_date, r.updated_date, r.resolved_date,
           r.citizen_id, r.municipality_id,
           u.cin AS citizen_cin,
           u.first_name AS citizen_first_name,
           u.last_name AS citizen_last_name,
           u.email AS citizen_email,
           u.phone AS citizen_phone
    FROM requests r
    LEFT JOIN app_users u ON u.id = r.citizen_id
"#;

const REQUEST_COUNT: &str =
    "SELECT COUNT(*) FROM requests r LEFT JOIN app_users u ON u.id = r.citizen_id";

const CONTACT_COLUMNS: [&str; 5] = ["u.cin", "u.first_name", "u.last_name", "u.email", "u.phone"];

/// Listing query: the filter fields plus paging, kept flat for the query
/// string decoder. `status` may be repeated; occurrences are joined.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub status: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub description: Option<String>,
    pub id: Option<i64>,
    pub citizen: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort: Option<String>,
}

impl ListQuery {
    pub fn from_query_string(raw: &str) -> Result<Self, ApiError> {
        let invalid = |e: serde_urlencoded::de::Error| ApiError::BadRequest(format!("Invalid query: {}", e));

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw).map_err(invalid)?;
        let mut merged: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match merged.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, joined)) if key == "status" => {
                    joined.push(',');
                    joined.push_str(&value);
                }
                Some(_) => {
                    return Err(ApiError::BadRequest(format!(
                        "Query parameter '{}' given more than once",
                        key
                    )))
                }
                None => merged.push((key, value)),
            }
        }

        let normalized = serde_urlencoded::to_string(&merged)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query: {}", e)))?;
        serde_urlencoded::from_str(&normalized).map_err(invalid)
    }

    fn filter(&self) -> RequestFilter {
        RequestFilter {
            service_type: self.service_type.clone(),
            status: self.status.clone(),
            created_from: self.created_from,
            created_to: self.created_to,
            description: self.description.clone(),
            id: self.id,
            citizen: self.citizen.clone(),
        }
    }

    fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            size: self.size,
            sort: self
                .sort
                .clone()
                .or_else(|| Some("createdDate,desc".to_string())),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ListQuery {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        ListQuery::from_query_string(parts.uri.query().unwrap_or_default())
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

pub async fn fetch_request(pool: &PgPool, id: i64) -> Result<Option<RequestRow>, sqlx::Error> {
    sqlx::query_as::<_, RequestRow>(&format!("{} WHERE r.id = $1", REQUEST_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Load a request the caller may see. Invisible and missing requests are
/// both reported as not found.
pub async fn load_visible(pool: &PgPool, caller: &Caller, id: i64) -> Result<RequestRow, ApiError> {
    match fetch_request(pool, id).await? {
        Some(row) if caller.role.can_view(caller.id(), row.citizen_id) => Ok(row),
        _ => Err(ApiError::NotFound("Request")),
    }
}

/// `ORDER BY` clause for a `property,direction` sort key
pub fn order_by(page: &PageRequest) -> Result<String, ApiError> {
    let (property, descending) = page.sort_key();
    let column = match property.as_str() {
        "id" => None,
        "createdDate" => Some("r.created_date"),
        "status" => Some("r.status::text"),
        "type" => Some("r.service_type"),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Cannot sort requests by '{}'",
                other
            )))
        }
    };
    let direction = if descending { "DESC" } else { "ASC" };
    Ok(match column {
        Some(column) => format!("{column} {direction}, r.id {direction}"),
        None => format!("r.id {direction}"),
    })
}

/// Append `conditions` as a `WHERE` clause
pub fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match condition {
            Condition::OwnedBy(citizen_id) => {
                builder.push("r.citizen_id = ").push_bind(*citizen_id);
            }
            Condition::ServiceType { needle, labelled } => {
                let values: Vec<String> = labelled.iter().map(|v| v.to_string()).collect();
                builder
                    .push("(STRPOS(LOWER(r.service_type), ")
                    .push_bind(needle.clone())
                    .push(") > 0 OR r.service_type = ANY(")
                    .push_bind(values)
                    .push("))");
            }
            Condition::StatusIn(statuses) => {
                let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
                builder.push("r.status::text = ANY(").push_bind(names).push(")");
            }
            Condition::CreatedFrom(from) => {
                builder.push("r.created_date >= ").push_bind(*from);
            }
            Condition::CreatedBefore(before) => {
                builder.push("r.created_date < ").push_bind(*before);
            }
            Condition::DescriptionContains(needle) => {
                builder
                    .push("STRPOS(LOWER(r.description), ")
                    .push_bind(needle.clone())
                    .push(") > 0");
            }
            Condition::IdEquals(id) => {
                builder.push("r.id = ").push_bind(*id);
            }
            Condition::CitizenContains(needle) => {
                builder.push("(");
                for (j, column) in CONTACT_COLUMNS.iter().enumerate() {
                    if j > 0 {
                        builder.push(" OR ");
                    }
                    builder
                        .push(format!("STRPOS(LOWER(COALESCE({}, '')), ", column))
                        .push_bind(needle.clone())
                        .push(") > 0");
                }
                builder.push(")");
            }
        }
    }
}

/// Page query for `conditions`, ordered and limited
fn page_query(conditions: &[Condition], page: &PageRequest) -> Result<QueryBuilder<'static, Postgres>, ApiError> {
    let order = order_by(page)?;
    let mut builder = QueryBuilder::new(REQUEST_SELECT);
    push_conditions(&mut builder, conditions);
    builder
        .push(" ORDER BY ")
        .push(order)
        .push(" LIMIT ")
        .push_bind(page.size())
        .push(" OFFSET ")
        .push_bind(page.offset());
    Ok(builder)
}

async fn list(state: &AppState, caller: &Caller, listing: Listing, query: ListQuery) -> Result<Response, ApiError> {
    let scope = caller.role.list_scope(caller.id(), listing)?;
    let filter = query.filter();
    // Refuse disallowed filters before touching storage
    filter.authorize(caller.role)?;
    let conditions = filter.compile()?.conditions(scope);
    let page = query.page_request();
    let mut select = page_query(&conditions, &page)?;

    let mut count = QueryBuilder::new(REQUEST_COUNT);
    push_conditions(&mut count, &conditions);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&state.pool).await?;

    let rows: Vec<RequestRow> = select.build_query_as::<RequestRow>().fetch_all(&state.pool).await?;
    let items: Vec<RequestDto> = rows
        .into_iter()
        .map(|row| access::to_dto(row, caller.role))
        .collect();

    Ok(paginated(items, total))
}

// =============================================================================
// Endpoints
// =============================================================================

/// `GET /api/requests` (agents and admins)
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: ListQuery,
) -> Result<Response, ApiError> {
    list(&state, &caller, Listing::All, query).await
}

/// `GET /api/requests/mine`
pub async fn list_my_requests(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: ListQuery,
) -> Result<Response, ApiError> {
    list(&state, &caller, Listing::Mine, query).await
}

/// `GET /api/requests/stats`
pub async fn get_request_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<StatusCounts>, ApiError> {
    let listing = if caller.role.is_staff() {
        Listing::All
    } else {
        Listing::Mine
    };

    let counts: Vec<(RequestStatus, i64)> = match caller.role.list_scope(caller.id(), listing)? {
        Scope::Own(citizen_id) => {
            sqlx::query_as(
                "SELECT status, COUNT(*) FROM requests WHERE citizen_id = $1 GROUP BY status",
            )
            .bind(citizen_id)
            .fetch_all(&state.pool)
            .await?
        }
        Scope::All => {
            sqlx::query_as("SELECT status, COUNT(*) FROM requests GROUP BY status")
                .fetch_all(&state.pool)
                .await?
        }
    };

    let mut stats = StatusCounts::default();
    for (status, count) in counts {
        stats.add(status, count);
    }
    Ok(Json(stats))
}

/// `GET /api/requests/{id}`
pub async fn get_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<RequestDto>, ApiError> {
    let row = load_visible(&state.pool, &caller, id).await?;
    Ok(Json(access::to_dto(row, caller.role)))
}

/// `POST /api/requests`
pub async fn create_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = validation::service_for(&input.service_type)?;
    let (description, form) = validation::resolve_submission(service, &input.description, input.form)?;
    let status = lifecycle::initial_status(input.status);
    let municipality_id = input.municipality_id.or(caller.user.municipality_id);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO requests (service_type, description, status, form_data, citizen_id, municipality_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(service.value)
    .bind(&description)
    .bind(status)
    .bind(SqlJson(&form))
    .bind(caller.id())
    .bind(municipality_id)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "request_created",
        "request",
        Some(id),
        Some(caller.id()),
        Some(serde_json::json!({ "type": service.value })),
    )
    .await;
    tracing::info!("User {} created request {} ({})", caller.id(), id, service.value);

    let row = fetch_request(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Request"))?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/requests/{}", id))],
        Json(access::to_dto(row, caller.role)),
    ))
}

/// `PUT /api/requests/{id}`
pub async fn update_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateRequest>,
) -> Result<Json<RequestDto>, ApiError> {
    check_body_id(id, input.id)?;
    let current = load_visible(&state.pool, &caller, id).await?;
    let is_owner = current.citizen_id == caller.id();

    let plan = lifecycle::plan_update(
        caller.role,
        is_owner,
        current.status,
        current.resolved_date,
        &input,
        Utc::now(),
    )?;

    let service = validation::service_for(&input.service_type)?;
    let (description, form) = validation::resolve_submission(service, &input.description, input.form)?;

    sqlx::query(
        r#"
        UPDATE requests
        SET service_type = $1, description = $2, form_data = $3, status = $4,
            resolved_date = $5, municipality_id = COALESCE($6, municipality_id),
            updated_date = NOW()
        WHERE id = $7
        "#,
    )
    .bind(service.value)
    .bind(&description)
    .bind(SqlJson(&form))
    .bind(plan.status)
    .bind(plan.resolved_date)
    .bind(input.municipality_id)
    .bind(id)
    .execute(&state.pool)
    .await?;

    log_audit(&state.pool, "request_updated", "request", Some(id), Some(caller.id()), None).await;
    if plan.status_changed {
        log_status_change(&state.pool, id, caller.id(), current.status, plan.status).await;
    }

    let row = fetch_request(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Request"))?;
    Ok(Json(access::to_dto(row, caller.role)))
}

/// `PATCH /api/requests/{id}/status` (agents and admins)
pub async fn update_request_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateStatusRequest>,
) -> Result<Json<RequestDto>, ApiError> {
    let current = load_visible(&state.pool, &caller, id).await?;
    let plan = lifecycle::plan_status_change(
        caller.role,
        current.status,
        current.resolved_date,
        input.status,
        Utc::now(),
    )?;

    sqlx::query(
        "UPDATE requests SET status = $1, resolved_date = $2, updated_date = NOW() WHERE id = $3",
    )
    .bind(plan.status)
    .bind(plan.resolved_date)
    .bind(id)
    .execute(&state.pool)
    .await?;

    if plan.status_changed {
        log_status_change(&state.pool, id, caller.id(), current.status, plan.status).await;
    }

    let row = fetch_request(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Request"))?;
    Ok(Json(access::to_dto(row, caller.role)))
}

/// `DELETE /api/requests/{id}`: removes messages, attachments and
/// appointments with it
pub async fn delete_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let current = load_visible(&state.pool, &caller, id).await?;
    if !caller.role.can_delete(caller.id(), current.citizen_id) {
        return Err(ApiError::Forbidden(
            "Only the owner or an administrator can delete a request".to_string(),
        ));
    }

    // Files first; rows cascade from the request
    let dir = attachments::request_dir(&state.upload_dir, id);
    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!("Failed to remove attachment directory {:?}: {}", dir, e);
        }
    }

    sqlx::query("DELETE FROM requests WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_audit(
        &state.pool,
        "request_deleted",
        "request",
        Some(id),
        Some(caller.id()),
        Some(serde_json::json!({ "type": current.service_type, "citizen_id": current.citizen_id })),
    )
    .await;
    tracing::info!("User {} deleted request {}", caller.id(), id);

    Ok(StatusCode::NO_CONTENT)
}

async fn log_status_change(pool: &PgPool, id: i64, actor: i64, from: RequestStatus, to: RequestStatus) {
    log_audit(
        pool,
        "request_status_changed",
        "request",
        Some(id),
        Some(actor),
        Some(serde_json::json!({ "from": from, "to": to })),
    )
    .await;
    tracing::info!("Request {} moved from {} to {} by {}", id, from, to, actor);
}
