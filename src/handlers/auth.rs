//! Authentication handlers

use crate::error::ApiError;
use crate::models::*;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Extension, Json,
};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::net::{IpAddr, SocketAddr};

use super::{log_audit, AppState, Caller};

/// Rate limit: max attempts per IP per hour
pub const MAX_LOGIN_ATTEMPTS: i64 = 10;

// =============================================================================
// Endpoints
// =============================================================================

/// `POST /api/authenticate`
pub async fn authenticate(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> Result<Json<JwtToken>, ApiError> {
    let client_ip = get_client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr.ip()),
        &state.trusted_proxies,
    );

    if !check_rate_limit(&state.pool, &client_ip, "login", MAX_LOGIN_ATTEMPTS).await {
        tracing::warn!("Login rate limit reached for {}", client_ip);
        return Err(ApiError::TooManyRequests);
    }
    record_attempt(&state.pool, &client_ip, "login").await;

    let user = sqlx::query_as::<_, AppUser>("SELECT * FROM app_users WHERE cin = $1")
        .bind(input.username.trim())
        .fetch_optional(&state.pool)
        .await?;

    // Same answer whether the login exists or not
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());
    let user = user.ok_or_else(invalid)?;
    if !verify_password(&input.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = generate_session_token();
    let expires_at = if input.remember_me {
        Utc::now() + Duration::days(state.remember_me_expiry_days)
    } else {
        Utc::now() + Duration::hours(state.session_expiry_hours)
    };
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(500).collect::<String>());

    sqlx::query(
        r#"
        INSERT INTO sessions (app_user_id, token_hash, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user.id)
    .bind(hash_token(&token))
    .bind(expires_at)
    .bind(&client_ip)
    .bind(&user_agent)
    .execute(&state.pool)
    .await?;

    log_audit(
        &state.pool,
        "login",
        "app_user",
        Some(user.id),
        Some(user.id),
        Some(serde_json::json!({ "ip": client_ip })),
    )
    .await;
    tracing::info!("User {} authenticated", user.id);

    Ok(Json(JwtToken { id_token: token }))
}

/// `POST /api/logout`
pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if let Some(token) = extract_bearer_token(&headers) {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(hash_token(&token))
            .execute(&state.pool)
            .await?;
    }

    log_audit(&state.pool, "logout", "app_user", Some(caller.id()), Some(caller.id()), None).await;
    Ok(Json(ApiResponse::success(())))
}

/// `GET /api/account`
pub async fn get_account(Extension(caller): Extension<Caller>) -> Json<Account> {
    Json(Account::from(&caller.user))
}

// =============================================================================
// Session Resolution
// =============================================================================

/// Resolve the bearer token in `headers` to an account, if any
pub async fn resolve_caller(pool: &PgPool, headers: &HeaderMap) -> Result<Option<Caller>, ApiError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Ok(None);
    };

    let user = sqlx::query_as::<_, AppUser>(
        r#"
        SELECT u.* FROM app_users u
        JOIN sessions s ON s.app_user_id = u.id
        WHERE s.token_hash = $1 AND s.expires_at > NOW()
        "#,
    )
    .bind(hash_token(&token))
    .fetch_optional(pool)
    .await?;

    Ok(user.map(Caller::new))
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

// =============================================================================
// Password and Token Utilities
// =============================================================================

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Invalid password hash in database: {}", e);
            false
        }
    }
}

fn generate_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Sessions are stored by the SHA-256 of their token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Client address. Forwarding headers are only believed when the direct
/// peer is one of the trusted proxies.
pub fn get_client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted_proxies: &[String]) -> String {
    let peer_str = peer.map(|ip| ip.to_string());
    let from_trusted_proxy = peer_str
        .as_deref()
        .is_some_and(|ip| trusted_proxies.iter().any(|prefix| ip.starts_with(prefix.as_str())));

    if from_trusted_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
        if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return ip.trim().to_string();
        }
    }

    peer_str.unwrap_or_else(|| "unknown".to_string())
}

pub async fn check_rate_limit(pool: &PgPool, ip: &str, endpoint: &str, max: i64) -> bool {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM rate_limit_attempts
        WHERE ip_address = $1 AND endpoint = $2
        AND attempted_at > NOW() - INTERVAL '1 hour'
        "#,
    )
    .bind(ip)
    .bind(endpoint)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| {
        tracing::warn!("Rate limit lookup failed: {}", e);
        0
    });

    count < max
}

pub async fn record_attempt(pool: &PgPool, ip: &str, endpoint: &str) {
    let result = sqlx::query("INSERT INTO rate_limit_attempts (ip_address, endpoint) VALUES ($1, $2)")
        .bind(ip)
        .bind(endpoint)
        .execute(pool)
        .await;
    if let Err(e) = result {
        tracing::warn!("Failed to record attempt for {}: {}", endpoint, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("motdepasse123").unwrap();
        assert!(verify_password("motdepasse123", &hash));
        assert!(!verify_password("autre", &hash));
        assert!(!verify_password("motdepasse123", "not-a-hash"));
    }

    #[test]
    fn test_session_tokens() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_eq!(hash_token(&a).len(), 64);
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[test]
    fn test_client_ip_trusts_only_known_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("41.226.1.2, 10.0.0.5"));
        let proxies = vec!["10.0.0.".to_string()];

        let via_proxy: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(get_client_ip(&headers, Some(via_proxy), &proxies), "41.226.1.2");

        let direct: IpAddr = "196.203.4.4".parse().unwrap();
        assert_eq!(get_client_ip(&headers, Some(direct), &proxies), "196.203.4.4");

        assert_eq!(get_client_ip(&headers, None, &proxies), "unknown");
    }
}
