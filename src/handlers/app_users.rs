//! Account records: sign-up, listing and profile updates

use crate::access::Role;
use crate::error::ApiError;
use crate::models::*;
use crate::validation::ValidationError;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use validator::Validate;

use super::auth::{hash_password, resolve_caller};
use super::{check_body_id, log_audit, paginated, AppState, Caller};

/// Role for a new account. Only an admin may hand out anything above
/// `ROLE_USER`; everyone else gets a citizen account whatever they asked for.
pub fn role_for_new_account(creator: Option<Role>, requested: Option<&str>) -> Result<Role, ApiError> {
    match (creator, requested) {
        (Some(Role::Admin), Some(raw)) => Role::from_authority(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", raw))),
        _ => Ok(Role::User),
    }
}

fn user_sort_column(page: &PageRequest) -> Result<(&'static str, bool), ApiError> {
    let (property, descending) = page.sort_key();
    let column = match property.as_str() {
        "id" => "id",
        "cin" | "login" => "cin",
        "lastName" => "last_name",
        "createdDate" => "created_date",
        other => return Err(ApiError::BadRequest(format!("Cannot sort users by '{}'", other))),
    };
    Ok((column, descending))
}

/// `POST /api/app-users`: public sign-up, or account creation by an admin
pub async fn create_app_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateAppUser>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ValidationError::from)?;

    let creator = resolve_caller(&state.pool, &headers).await?;
    let role = role_for_new_account(creator.as_ref().map(|c| c.role), input.role.as_deref())?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?;

    let user = sqlx::query_as::<_, AppUser>(
        r#"
        INSERT INTO app_users
            (cin, first_name, last_name, email, phone, role, address, birth_date, municipality_id, password_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(input.cin.trim())
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(input.email.trim().to_lowercase())
    .bind(&input.phone)
    .bind(role.authority())
    .bind(&input.address)
    .bind(input.birth_date)
    .bind(input.municipality_id)
    .bind(password_hash)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "user_created",
        "app_user",
        Some(user.id),
        creator.as_ref().map(Caller::id),
        Some(serde_json::json!({ "role": role.authority() })),
    )
    .await;
    tracing::info!("Account {} created with {}", user.id, role);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/app-users/{}", user.id))],
        Json(AppUserDto::from(user)),
    ))
}

/// `GET /api/app-users` (agents and admins)
pub async fn list_app_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(page): Query<PageRequest>,
) -> Result<Response, ApiError> {
    caller.require_staff()?;
    let (column, descending) = user_sort_column(&page)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_users")
        .fetch_one(&state.pool)
        .await?;

    let users = sqlx::query_as::<_, AppUser>(&format!(
        "SELECT * FROM app_users ORDER BY {} {}, id LIMIT $1 OFFSET $2",
        column,
        if descending { "DESC" } else { "ASC" }
    ))
    .bind(page.size())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(paginated(
        users.into_iter().map(AppUserDto::from).collect(),
        total,
    ))
}

/// `GET /api/app-users/{id}` (self, agents and admins)
pub async fn get_app_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<AppUserDto>, ApiError> {
    if id != caller.id() && !caller.role.is_staff() {
        return Err(ApiError::NotFound("User"));
    }

    let user = sqlx::query_as::<_, AppUser>("SELECT * FROM app_users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(AppUserDto::from(user)))
}

/// `PUT /api/app-users/{id}`: own profile, or any account for an admin.
/// Changing the role is admin only.
pub async fn update_app_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateAppUser>,
) -> Result<Json<AppUserDto>, ApiError> {
    check_body_id(id, input.id)?;
    input.validate().map_err(ValidationError::from)?;

    let is_admin = caller.role == Role::Admin;
    if id != caller.id() && !is_admin {
        return Err(ApiError::Forbidden(
            "You can only update your own account".to_string(),
        ));
    }

    let current = sqlx::query_as::<_, AppUser>("SELECT * FROM app_users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let role = match input.role.as_deref() {
        Some(raw) if raw != current.role => {
            if !is_admin {
                return Err(ApiError::Forbidden(
                    "Only an administrator can change roles".to_string(),
                ));
            }
            Role::from_authority(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", raw)))?
                .authority()
                .to_string()
        }
        _ => current.role.clone(),
    };

    let user = sqlx::query_as::<_, AppUser>(
        r#"
        UPDATE app_users
        SET email = $1, first_name = $2, last_name = $3, phone = $4, address = $5,
            birth_date = $6, municipality_id = $7, role = $8
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(input.email.trim().to_lowercase())
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.phone)
    .bind(&input.address)
    .bind(input.birth_date)
    .bind(input.municipality_id)
    .bind(&role)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "user_updated",
        "app_user",
        Some(id),
        Some(caller.id()),
        (role != current.role).then(|| serde_json::json!({ "from": current.role, "to": role })),
    )
    .await;

    Ok(Json(AppUserDto::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_is_always_a_citizen() {
        assert_eq!(role_for_new_account(None, Some("ROLE_ADMIN")).unwrap(), Role::User);
        assert_eq!(role_for_new_account(None, None).unwrap(), Role::User);
        assert_eq!(
            role_for_new_account(Some(Role::Agent), Some("ROLE_AGENT")).unwrap(),
            Role::User
        );
    }

    #[test]
    fn test_admin_may_assign_roles() {
        assert_eq!(
            role_for_new_account(Some(Role::Admin), Some("ROLE_AGENT")).unwrap(),
            Role::Agent
        );
        assert_eq!(role_for_new_account(Some(Role::Admin), None).unwrap(), Role::User);
        assert!(matches!(
            role_for_new_account(Some(Role::Admin), Some("ROLE_ROOT")),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_user_sort_whitelist() {
        let page = PageRequest {
            sort: Some("lastName,desc".to_string()),
            ..Default::default()
        };
        assert_eq!(user_sort_column(&page).unwrap(), ("last_name", true));
        let page = PageRequest {
            sort: Some("password_hash".to_string()),
            ..Default::default()
        };
        assert!(user_sort_column(&page).is_err());
    }

    #[test]
    fn test_sign_up_payload_validation() {
        let input: CreateAppUser = serde_json::from_value(serde_json::json!({
            "cin": "08123456",
            "password": "court",
            "email": "pas-un-email"
        }))
        .unwrap();
        let err = ValidationError::from(input.validate().unwrap_err());
        let message = err.to_string();
        assert!(message.contains("password"));
        assert!(message.contains("email"));
    }
}
