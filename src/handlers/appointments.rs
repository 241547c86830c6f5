//! Appointments scheduled against a request

use crate::error::ApiError;
use crate::models::{Appointment, AppointmentStatus, CreateAppointment};
use crate::validation::{ValidationError, MAX_TEXT_LENGTH};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::requests::load_visible;
use super::{log_audit, AppState, Caller};

/// `GET /api/requests/{id}/appointments`
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    load_visible(&state.pool, &caller, request_id).await?;

    let appointments = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT id, request_id, date_time, location, notes, status
        FROM request_appointments
        WHERE request_id = $1
        ORDER BY date_time, id
        "#,
    )
    .bind(request_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(appointments))
}

/// `POST /api/requests/{id}/appointments` (agents and admins)
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<i64>,
    Json(input): Json<CreateAppointment>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    caller.require_staff()?;
    load_visible(&state.pool, &caller, request_id).await?;

    if input.location.as_deref().is_some_and(|l| l.chars().count() > 255) {
        return Err(ValidationError::TooLong {
            field: "location".to_string(),
            max: 255,
        }
        .into());
    }
    if input.notes.as_deref().is_some_and(|n| n.chars().count() > MAX_TEXT_LENGTH) {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_TEXT_LENGTH,
        }
        .into());
    }

    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO request_appointments (request_id, date_time, location, notes, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, request_id, date_time, location, notes, status
        "#,
    )
    .bind(request_id)
    .bind(input.date_time)
    .bind(&input.location)
    .bind(&input.notes)
    .bind(input.status.unwrap_or(AppointmentStatus::Pending))
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "appointment_created",
        "request",
        Some(request_id),
        Some(caller.id()),
        Some(serde_json::json!({
            "appointment_id": appointment.id,
            "date_time": appointment.date_time,
        })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(appointment)))
}
