//! Typed client for the portal API
//!
//! [`PortalClient`] wraps `reqwest` with one method per endpoint. The
//! session is passed in explicitly and attached as a bearer header to every
//! authenticated call. [`RequestsView`] layers the query cache and the
//! optimistic mutation pipeline on top.

mod cache;
mod session;
mod view;

pub use cache::{Cached, FetchTicket, QueryCache, QueryId, QueryKey};
pub use session::Session;
pub use view::RequestsView;

use crate::access::RequestFilter;
use crate::models::*;
use crate::validation::{self, ValidationError};
use reqwest::{header::AUTHORIZATION, multipart, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

/// One page of a listing with the server's total count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<Session>,
}

impl PortalClient {
    pub fn new(base_url: impl Into<String>, session: Option<Session>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ClientError::Authentication("Not signed in".to_string()))?;
        Ok(self
            .http
            .request(method, self.url(path))
            .header(AUTHORIZATION, session.bearer()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        read_json(self.authed(Method::GET, path)?.send().await?).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        read_json(self.authed(method, path)?.json(body).send().await?).await
    }

    async fn get_page<T: DeserializeOwned, Q: Serialize>(
        &self,
        path: &str,
        filter: &Q,
        page: &PageRequest,
    ) -> Result<Page<T>, ClientError> {
        let response = check(
            self.authed(Method::GET, path)?
                .query(filter)
                .query(page)
                .send()
                .await?,
        )
        .await?;

        let total = response
            .headers()
            .get("X-Total-Count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());
        let items: Vec<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Network(format!("Malformed response: {}", e)))?;

        Ok(Page {
            total: total.unwrap_or(items.len() as i64),
            items,
        })
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Sign in and keep the resulting session on this client
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, ClientError> {
        let response = self
            .public(Method::POST, "/api/authenticate")
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
                remember_me,
            })
            .send()
            .await?;
        let JwtToken { id_token } = read_json(response).await?;

        let account: Account = read_json(
            self.public(Method::GET, "/api/account")
                .header(AUTHORIZATION, format!("Bearer {}", id_token))
                .send()
                .await?,
        )
        .await?;

        let session = Session::new(id_token, account);
        tracing::info!("Signed in as {} ({})", session.account.login, session.role);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// End the session on the server. The local session is dropped even if
    /// the server call fails.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if self.session.is_none() {
            return Ok(());
        }
        let result = match self.authed(Method::POST, "/api/logout")?.send().await {
            Ok(response) => check(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        self.session = None;
        result
    }

    pub async fn account(&self) -> Result<Account, ClientError> {
        self.get("/api/account").await
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn sign_up(&self, input: &CreateAppUser) -> Result<AppUserDto, ClientError> {
        input.validate().map_err(ValidationError::from)?;
        let mut builder = self.public(Method::POST, "/api/app-users").json(input);
        // An admin creating staff accounts signs the call
        if let Some(session) = &self.session {
            builder = builder.header(AUTHORIZATION, session.bearer());
        }
        read_json(builder.send().await?).await
    }

    pub async fn list_app_users(&self, page: &PageRequest) -> Result<Page<AppUserDto>, ClientError> {
        self.get_page("/api/app-users", &(), page).await
    }

    pub async fn update_app_user(&self, id: i64, input: &UpdateAppUser) -> Result<AppUserDto, ClientError> {
        input.validate().map_err(ValidationError::from)?;
        let body = UpdateAppUser {
            id: Some(id),
            ..input.clone()
        };
        self.send_json(Method::PUT, &format!("/api/app-users/{}", id), &body)
            .await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<Page<RequestDto>, ClientError> {
        self.get_page("/api/requests", filter, page).await
    }

    pub async fn list_my_requests(
        &self,
        filter: &RequestFilter,
        page: &PageRequest,
    ) -> Result<Page<RequestDto>, ClientError> {
        self.get_page("/api/requests/mine", filter, page).await
    }

    pub async fn get_request(&self, id: i64) -> Result<RequestDto, ClientError> {
        self.get(&format!("/api/requests/{}", id)).await
    }

    pub async fn request_stats(&self) -> Result<StatusCounts, ClientError> {
        self.get("/api/requests/stats").await
    }

    /// Submit a new request. The form is checked against the catalog first
    /// and an invalid one never leaves the client.
    pub async fn create_request(&self, input: &CreateRequest) -> Result<RequestDto, ClientError> {
        let service = validation::service_for(&input.service_type)?;
        let (description, form) =
            validation::resolve_submission(service, &input.description, input.form.clone())?;

        let body = CreateRequest {
            description,
            status: None,
            form: Some(form),
            ..input.clone()
        };
        self.send_json(Method::POST, "/api/requests", &body).await
    }

    pub async fn update_request(&self, id: i64, input: &UpdateRequest) -> Result<RequestDto, ClientError> {
        let service = validation::service_for(&input.service_type)?;
        let (description, form) =
            validation::resolve_submission(service, &input.description, input.form.clone())?;

        let body = UpdateRequest {
            id: Some(id),
            description,
            form: Some(form),
            ..input.clone()
        };
        self.send_json(Method::PUT, &format!("/api/requests/{}", id), &body)
            .await
    }

    pub async fn update_status(&self, id: i64, status: RequestStatus) -> Result<RequestDto, ClientError> {
        self.send_json(
            Method::PATCH,
            &format!("/api/requests/{}/status", id),
            &UpdateStatusRequest { status },
        )
        .await
    }

    pub async fn delete_request(&self, id: i64) -> Result<(), ClientError> {
        let response = self
            .authed(Method::DELETE, &format!("/api/requests/{}", id))?
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    // =========================================================================
    // Request sub-resources
    // =========================================================================

    pub async fn list_messages(&self, request_id: i64) -> Result<Vec<RequestMessage>, ClientError> {
        self.get(&format!("/api/requests/{}/messages", request_id))
            .await
    }

    pub async fn post_message(&self, request_id: i64, content: &str) -> Result<RequestMessage, ClientError> {
        let content = validation::validate_message_content(content)?;
        self.send_json(
            Method::POST,
            &format!("/api/requests/{}/messages", request_id),
            &CreateMessage { content },
        )
        .await
    }

    pub async fn list_attachments(&self, request_id: i64) -> Result<Vec<AttachmentDto>, ClientError> {
        self.get(&format!("/api/requests/{}/attachments", request_id))
            .await
    }

    pub async fn upload_attachment(
        &self,
        request_id: i64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<AttachmentDto, ClientError> {
        validation::validate_filename_extensions(filename)?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFile.into());
        }

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|_| ValidationError::InvalidFileType {
                mime_type: content_type.to_string(),
            })?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .authed(
                Method::POST,
                &format!("/api/requests/{}/attachments", request_id),
            )?
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn list_appointments(&self, request_id: i64) -> Result<Vec<Appointment>, ClientError> {
        self.get(&format!("/api/requests/{}/appointments", request_id))
            .await
    }

    pub async fn create_appointment(
        &self,
        request_id: i64,
        input: &CreateAppointment,
    ) -> Result<Appointment, ClientError> {
        self.send_json(
            Method::POST,
            &format!("/api/requests/{}/appointments", request_id),
            input,
        )
        .await
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    pub async fn list_municipalities(&self, page: &PageRequest) -> Result<Page<Municipality>, ClientError> {
        self.get_page("/api/municipalities", &(), page).await
    }

    pub async fn list_documents(&self, page: &PageRequest) -> Result<Page<DocumentDto>, ClientError> {
        self.get_page("/api/documents", &(), page).await
    }
}

/// Error envelope the server renders for failures
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Map a non-success response to a [`ClientError`]
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::Authentication(message))
    } else {
        Err(ClientError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    check(response)
        .await?
        .json()
        .await
        .map_err(|e| ClientError::Network(format!("Malformed response: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::form_encoding::FormSubmission;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn dto(id: i64, status: RequestStatus) -> RequestDto {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        RequestDto {
            id,
            service_type: "ENTRETIEN_VOIRIE".to_string(),
            description: "Nid de poule".to_string(),
            status,
            created_date: created,
            updated_date: created,
            resolved_date: None,
            citizen_id: 7,
            municipality_id: Some(1),
            form: FormSubmission::default(),
            legacy_description: "Nid de poule".to_string(),
            missing_documents: vec![],
            citizen_cin: None,
            citizen_first_name: None,
            citizen_last_name: None,
            citizen_email: None,
            citizen_phone: None,
        }
    }

    pub(crate) fn signed_in(server: &MockServer, authorities: &[&str]) -> PortalClient {
        let session = Session::new("tok", session::tests::account(authorities));
        PortalClient::new(server.uri(), Some(session)).unwrap()
    }

    #[tokio::test]
    async fn test_login_builds_session_from_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/authenticate"))
            .and(body_partial_json(serde_json::json!({
                "username": "08123457",
                "rememberMe": true
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id_token": "tok" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/account"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(session::tests::account(&["ROLE_USER", "ROLE_AGENT"])),
            )
            .mount(&server)
            .await;

        let mut client = PortalClient::new(server.uri(), None).unwrap();
        let session = client.login("08123457", "secret-pass", true).await.unwrap();

        assert_eq!(session.token, "tok");
        assert_eq!(session.role, crate::access::Role::Agent);
        assert_eq!(client.session(), Some(&session));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/authenticate"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "data": null,
                "error": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let mut client = PortalClient::new(server.uri(), None).unwrap();
        match client.login("x", "y", false).await {
            Err(ClientError::Authentication(message)) => assert_eq!(message, "Invalid credentials"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn test_calls_without_session_fail_locally() {
        let server = MockServer::start().await;
        let client = PortalClient::new(server.uri(), None).unwrap();
        assert!(matches!(
            client.get_request(1).await,
            Err(ClientError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_list_reads_total_count_and_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/requests"))
            .and(header("Authorization", "Bearer tok"))
            .and(query_param("status", "PENDING,IN_PROGRESS"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Total-Count", "42")
                    .set_body_json(vec![dto(1, RequestStatus::Pending)]),
            )
            .mount(&server)
            .await;

        let client = signed_in(&server, &["ROLE_AGENT"]);
        let filter = RequestFilter {
            status: Some("PENDING,IN_PROGRESS".to_string()),
            ..Default::default()
        };
        let page = PageRequest {
            page: Some(1),
            ..Default::default()
        };
        let result = client.list_requests(&filter, &page).await.unwrap();

        assert_eq!(result.total, 42);
        assert_eq!(result.items, vec![dto(1, RequestStatus::Pending)]);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/requests"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = signed_in(&server, &["ROLE_USER"]);
        let unknown = CreateRequest {
            service_type: "NO_SUCH_SERVICE".to_string(),
            description: "x".to_string(),
            status: None,
            municipality_id: None,
            form: None,
        };
        assert!(matches!(
            client.create_request(&unknown).await,
            Err(ClientError::Validation(ValidationError::UnknownService(_)))
        ));

        let incomplete = CreateRequest {
            service_type: "PERMIS_CONSTRUIRE".to_string(),
            ..unknown
        };
        assert!(matches!(
            client.create_request(&incomplete).await,
            Err(ClientError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_create_sends_structured_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/requests"))
            .and(body_partial_json(serde_json::json!({
                "type": "PERMIS_CONSTRUIRE",
                "description": "Maison",
                "form": {
                    "fields": { "adresse": "12 Rue X" },
                    "documents": { "Copie CIN": "cin.pdf" }
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(dto(9, RequestStatus::Pending)))
            .expect(1)
            .mount(&server)
            .await;

        let client = signed_in(&server, &["ROLE_USER"]);
        let created = client
            .create_request(&CreateRequest {
                service_type: "PERMIS_CONSTRUIRE".to_string(),
                description: "Maison | adresse: 12 Rue X | numeroFoncier: 99 | typeConstruction: Villa | Copie CIN: cin.pdf".to_string(),
                status: Some(RequestStatus::Resolved),
                municipality_id: None,
                form: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id, 9);
    }

    #[tokio::test]
    async fn test_backend_errors_carry_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/requests/3/status"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "success": false,
                "data": null,
                "error": "This action requires the agent or admin role"
            })))
            .mount(&server)
            .await;

        let client = signed_in(&server, &["ROLE_USER"]);
        match client.update_status(3, RequestStatus::Resolved).await {
            Err(ClientError::Backend { status, message }) => {
                assert_eq!(status, 403);
                assert!(message.contains("agent or admin"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_locally() {
        let server = MockServer::start().await;
        let client = signed_in(&server, &["ROLE_USER"]);
        assert!(matches!(
            client.post_message(1, "   ").await,
            Err(ClientError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        let session = Session::new("tok", session::tests::account(&["ROLE_USER"]));
        let client = PortalClient::new("http://127.0.0.1:9", Some(session)).unwrap();
        assert!(matches!(
            client.request_stats().await,
            Err(ClientError::Network(_))
        ));
    }
}
