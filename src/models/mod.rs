//! Data models for the application
//!
//! Rows map one-to-one onto the tables in `db/migrations`. Wire types use the
//! camelCase JSON of the portal API.

use crate::form_encoding::FormSubmission;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appointment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

// =============================================================================
// Request
// =============================================================================

/// A request joined with its owner's contact details
#[derive(Debug, Clone, FromRow)]
pub struct RequestRow {
    pub id: i64,
    pub service_type: String,
    pub description: String,
    pub status: RequestStatus,
    pub form_data: Option<Json<FormSubmission>>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub resolved_date: Option<DateTime<Utc>>,
    pub citizen_id: i64,
    pub municipality_id: Option<i64>,
    pub citizen_cin: Option<String>,
    pub citizen_first_name: Option<String>,
    pub citizen_last_name: Option<String>,
    pub citizen_email: Option<String>,
    pub citizen_phone: Option<String>,
}

impl RequestRow {
    pub fn form(&self) -> FormSubmission {
        self.form_data
            .as_ref()
            .map(|f| f.0.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub description: String,
    /// Accepted for compatibility; new requests always start PENDING
    pub status: Option<RequestStatus>,
    pub municipality_id: Option<i64>,
    pub form: Option<FormSubmission>,
}

/// Full-object update, `PUT /api/requests/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub description: String,
    pub status: RequestStatus,
    pub municipality_id: Option<i64>,
    pub form: Option<FormSubmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestDto {
    pub id: i64,
    #[serde(rename = "type")]
    pub service_type: String,
    pub description: String,
    pub status: RequestStatus,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub resolved_date: Option<DateTime<Utc>>,
    pub citizen_id: i64,
    pub municipality_id: Option<i64>,
    #[serde(default)]
    pub form: FormSubmission,
    /// Description with the form packed into it, for consumers of the old layout
    #[serde(default)]
    pub legacy_description: String,
    /// Catalog documents with no submitted file
    #[serde(default)]
    pub missing_documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_cin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub rejected: i64,
    pub total: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: RequestStatus, count: i64) {
        match status {
            RequestStatus::Pending => self.pending += count,
            RequestStatus::InProgress => self.in_progress += count,
            RequestStatus::Resolved => self.resolved += count,
            RequestStatus::Rejected => self.rejected += count,
        }
        self.total += count;
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub id: i64,
    pub request_id: i64,
    pub author: String,
    pub content: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub content: String,
}

// =============================================================================
// Attachments
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct RequestAttachment {
    pub id: i64,
    pub request_id: i64,
    pub filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub content_type: String,
    pub file_size: i64,
    pub uploaded_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    pub id: i64,
    pub request_id: i64,
    pub filename: String,
    pub url: String,
    pub content_type: String,
    pub file_size: i64,
    pub preview_kind: crate::attachments::PreviewKind,
    pub uploaded_date: DateTime<Utc>,
}

// =============================================================================
// Appointments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub request_id: i64,
    pub date_time: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointment {
    pub date_time: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

// =============================================================================
// App User
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct AppUser {
    pub id: i64,
    pub cin: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub municipality_id: Option<i64>,
    pub password_hash: String,
    pub created_date: DateTime<Utc>,
}

impl AppUser {
    /// Display name for message authorship, falling back to the login
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.cin.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppUserDto {
    pub id: i64,
    pub cin: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub municipality_id: Option<i64>,
}

impl From<AppUser> for AppUserDto {
    fn from(user: AppUser) -> Self {
        Self {
            id: user.id,
            cin: user.cin,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            address: user.address,
            birth_date: user.birth_date,
            municipality_id: user.municipality_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppUser {
    #[validate(length(min = 4, max = 20))]
    pub cin: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub municipality_id: Option<i64>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppUser {
    pub id: Option<i64>,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub municipality_id: Option<i64>,
    pub role: Option<String>,
}

/// `GET /api/account`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub authorities: Vec<String>,
    pub activated: bool,
    pub lang_key: String,
}

impl From<&AppUser> for Account {
    fn from(user: &AppUser) -> Self {
        Self {
            id: user.id,
            login: user.cin.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            authorities: vec![user.role.clone()],
            activated: true,
            lang_key: "fr".to_string(),
        }
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtToken {
    pub id_token: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub app_user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

// =============================================================================
// Municipality
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Municipality {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipalityInput {
    pub id: Option<i64>,
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
}

// =============================================================================
// Citizen Document
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct CitizenDocument {
    pub id: i64,
    pub title: String,
    pub doc_type: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub file: Option<Vec<u8>>,
    pub file_content_type: String,
    pub citizen_id: Option<i64>,
}

/// Document on the wire; `file` is base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDto {
    pub id: Option<i64>,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub file: Option<String>,
    pub file_content_type: String,
    pub citizen_id: Option<i64>,
}

impl From<CitizenDocument> for DocumentDto {
    fn from(doc: CitizenDocument) -> Self {
        use base64::Engine;
        Self {
            id: Some(doc.id),
            title: doc.title,
            doc_type: doc.doc_type,
            issue_date: doc.issue_date,
            file: doc
                .file
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            file_content_type: doc.file_content_type,
            citizen_id: doc.citizen_id,
        }
    }
}

// =============================================================================
// API Responses
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// JHipster-style pagination query: `page` is zero based, `sort` is
/// `property,direction`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort: Option<String>,
}

impl PageRequest {
    pub const DEFAULT_SIZE: i64 = 20;
    pub const MAX_SIZE: i64 = 200;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE)
    }

    /// Rows to skip. Saturates instead of overflowing for absurd pages,
    /// which then simply come back empty.
    pub fn offset(&self) -> i64 {
        self.page().saturating_mul(self.size())
    }

    /// Sort property and whether it is descending
    pub fn sort_key(&self) -> (String, bool) {
        match self.sort.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let mut parts = raw.split(',');
                let property = parts.next().unwrap_or("").trim().to_string();
                let descending = parts
                    .next()
                    .map(|d| d.trim().eq_ignore_ascii_case("desc"))
                    .unwrap_or(false);
                (property, descending)
            }
            _ => ("id".to_string(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        let parsed: RequestStatus = serde_json::from_str("\"REJECTED\"").unwrap();
        assert_eq!(parsed, RequestStatus::Rejected);
    }

    #[test]
    fn test_create_request_accepts_contract_shape() {
        let input: CreateRequest = serde_json::from_str(
            r#"{"type":"PERMIS_CONSTRUIRE","description":"x","status":"RESOLVED"}"#,
        )
        .unwrap();
        assert_eq!(input.service_type, "PERMIS_CONSTRUIRE");
        assert_eq!(input.status, Some(RequestStatus::Resolved));
        assert!(input.form.is_none());
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        let page = PageRequest::default();
        assert_eq!((page.page(), page.size(), page.offset()), (0, 20, 0));

        let page = PageRequest {
            page: Some(3),
            size: Some(10_000),
            sort: Some("createdDate,DESC".to_string()),
        };
        assert_eq!(page.size(), PageRequest::MAX_SIZE);
        assert_eq!(page.offset(), 3 * PageRequest::MAX_SIZE);
        assert_eq!(page.sort_key(), ("createdDate".to_string(), true));
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let page = PageRequest {
            page: Some(i64::MAX),
            size: Some(50),
            sort: None,
        };
        assert_eq!(page.offset(), i64::MAX);

        let negative = PageRequest {
            page: Some(i64::MIN),
            ..Default::default()
        };
        assert_eq!(negative.offset(), 0);
    }

    #[test]
    fn test_display_name_falls_back_to_cin() {
        let mut user = AppUser {
            id: 1,
            cin: "08123456".to_string(),
            first_name: Some("Amel".to_string()),
            last_name: Some("Ben Salah".to_string()),
            email: "amel@example.tn".to_string(),
            phone: None,
            role: "ROLE_USER".to_string(),
            address: None,
            birth_date: None,
            municipality_id: None,
            password_hash: String::new(),
            created_date: Utc::now(),
        };
        assert_eq!(user.display_name(), "Amel Ben Salah");
        user.first_name = None;
        user.last_name = Some("  ".to_string());
        assert_eq!(user.display_name(), "08123456");
    }

    #[test]
    fn test_status_counts_add() {
        let mut counts = StatusCounts::default();
        counts.add(RequestStatus::Pending, 2);
        counts.add(RequestStatus::Resolved, 1);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.total, 3);
    }
}
