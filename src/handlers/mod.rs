//! HTTP request handlers

pub mod app_users;
pub mod appointments;
pub mod attachments;
pub mod auth;
pub mod documents;
pub mod messages;
pub mod middleware;
pub mod municipalities;
pub mod requests;
pub mod services;

use crate::access::Role;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::AppUser;
use axum::{
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::PgPool;
use std::path::PathBuf;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub max_upload_size: usize,
    pub session_expiry_hours: i64,
    pub remember_me_expiry_days: i64,
    pub is_production: bool,
    /// Trusted proxy IP prefixes for X-Forwarded-For validation
    pub trusted_proxies: Vec<String>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            upload_dir: PathBuf::from(&config.upload_dir),
            public_base_url: config.public_base_url.clone(),
            max_upload_size: config.max_upload_size,
            session_expiry_hours: config.session_expiry_hours,
            remember_me_expiry_days: config.remember_me_expiry_days,
            is_production: config.is_production(),
            trusted_proxies: config.trusted_proxies.clone(),
        }
    }
}

/// The authenticated account behind a request. The role is derived once
/// when the session is resolved.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: AppUser,
    pub role: Role,
}

impl Caller {
    pub fn new(user: AppUser) -> Self {
        let role = Role::from_authorities(&[user.role.as_str()]);
        Self { user, role }
    }

    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "This action requires the agent or admin role".to_string(),
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "This action requires the admin role".to_string(),
            ))
        }
    }
}

/// JSON list with the total row count in `X-Total-Count`
pub fn paginated<T: Serialize>(items: Vec<T>, total: i64) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("X-Total-Count", HeaderValue::from(total));
    (headers, Json(items)).into_response()
}

/// Reject a body whose id disagrees with the path
pub fn check_body_id(path_id: i64, body_id: Option<i64>) -> Result<(), ApiError> {
    match body_id {
        Some(id) if id == path_id => Ok(()),
        Some(_) => Err(ApiError::BadRequest("Invalid id: body and path differ".to_string())),
        None => Err(ApiError::BadRequest("Invalid id: missing in body".to_string())),
    }
}

/// Record an audit event. Failures are logged and otherwise ignored.
pub async fn log_audit(
    pool: &PgPool,
    action: &str,
    entity_type: &str,
    entity_id: Option<i64>,
    actor_id: Option<i64>,
    details: Option<serde_json::Value>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (action, entity_type, entity_id, actor_id, details)
        VALUES ($1::audit_action, $2, $3, $4, $5)
        "#,
    )
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(actor_id)
    .bind(details)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to write audit event {}: {}", action, e);
    }
}
