//! Cached request views for a signed-in client

use crate::access::RequestFilter;
use crate::models::{
    AttachmentDto, CreateRequest, PageRequest, RequestDto, RequestMessage, RequestStatus,
    StatusCounts,
};
use chrono::Utc;

use super::{ClientError, Page, PortalClient, QueryCache, QueryId, QueryKey};

/// Keys a change to request `id` can make stale
fn request_keys(id: i64) -> [QueryKey; 4] {
    [
        QueryKey::AllRequests,
        QueryKey::MyRequests,
        QueryKey::Request(id),
        QueryKey::Stats,
    ]
}

/// Request screens backed by one [`QueryCache`]. Reads go through the cache;
/// writes go through [`QueryCache::mutate`].
#[derive(Debug, Clone)]
pub struct RequestsView {
    client: PortalClient,
    cache: QueryCache,
}

impl RequestsView {
    pub fn new(client: PortalClient, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub async fn all(&self, filter: &RequestFilter, page: &PageRequest) -> Result<Page<RequestDto>, ClientError> {
        self.cache
            .fetch(
                QueryId::listing(QueryKey::AllRequests, filter, page),
                self.client.list_requests(filter, page),
            )
            .await
    }

    pub async fn mine(&self, filter: &RequestFilter, page: &PageRequest) -> Result<Page<RequestDto>, ClientError> {
        self.cache
            .fetch(
                QueryId::listing(QueryKey::MyRequests, filter, page),
                self.client.list_my_requests(filter, page),
            )
            .await
    }

    pub async fn request(&self, id: i64) -> Result<RequestDto, ClientError> {
        self.cache
            .fetch(QueryKey::Request(id), self.client.get_request(id))
            .await
    }

    pub async fn stats(&self) -> Result<StatusCounts, ClientError> {
        self.cache
            .fetch(QueryKey::Stats, self.client.request_stats())
            .await
    }

    pub async fn messages(&self, request_id: i64) -> Result<Vec<RequestMessage>, ClientError> {
        self.cache
            .fetch(
                QueryKey::Messages(request_id),
                self.client.list_messages(request_id),
            )
            .await
    }

    pub async fn attachments(&self, request_id: i64) -> Result<Vec<AttachmentDto>, ClientError> {
        self.cache
            .fetch(
                QueryKey::Attachments(request_id),
                self.client.list_attachments(request_id),
            )
            .await
    }

    /// Show the new status at once, then let the refetch decide
    pub async fn change_status(&self, id: i64, status: RequestStatus) -> Result<RequestDto, ClientError> {
        let now = Utc::now();
        self.cache
            .mutate(
                |cache| {
                    for key in [QueryKey::AllRequests, QueryKey::MyRequests, QueryKey::Request(id)] {
                        cache.patch(key, |value| value.apply_status(id, status, now));
                    }
                },
                self.client.update_status(id, status),
                &request_keys(id),
            )
            .await
    }

    pub async fn create(&self, input: &CreateRequest) -> Result<RequestDto, ClientError> {
        self.cache
            .mutate(
                |_| {},
                self.client.create_request(input),
                &[QueryKey::AllRequests, QueryKey::MyRequests, QueryKey::Stats],
            )
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.cache
            .mutate(
                |cache| {
                    for key in [QueryKey::AllRequests, QueryKey::MyRequests] {
                        cache.patch(key, |value| value.remove_request(id));
                    }
                },
                self.client.delete_request(id),
                &request_keys(id),
            )
            .await
    }

    pub async fn post_message(&self, request_id: i64, content: &str) -> Result<RequestMessage, ClientError> {
        self.cache
            .mutate(
                |_| {},
                self.client.post_message(request_id, content),
                &[QueryKey::Messages(request_id)],
            )
            .await
    }

    pub async fn upload_attachment(
        &self,
        request_id: i64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<AttachmentDto, ClientError> {
        self.cache
            .mutate(
                |_| {},
                self.client
                    .upload_attachment(request_id, filename, content_type, bytes),
                &[QueryKey::Attachments(request_id)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{dto, signed_in};
    use crate::client::Cached;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_get(server: &MockServer, route: &str, body: RequestDto) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_change_status_refetch_is_authoritative() {
        let server = MockServer::start().await;
        let view = RequestsView::new(signed_in(&server, &["ROLE_AGENT"]), QueryCache::new());

        mount_get(&server, "/api/requests/5", dto(5, RequestStatus::Pending)).await;
        view.request(5).await.unwrap();

        Mock::given(method("PATCH"))
            .and(path("/api/requests/5/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(dto(5, RequestStatus::Resolved)))
            .mount(&server)
            .await;
        let updated = view.change_status(5, RequestStatus::Resolved).await.unwrap();
        assert_eq!(updated.status, RequestStatus::Resolved);
        assert_eq!(view.cache().get(QueryKey::Request(5)), None);

        // Another agent got there last; the server state wins over our patch
        server.reset().await;
        mount_get(&server, "/api/requests/5", dto(5, RequestStatus::Rejected)).await;
        assert_eq!(view.request(5).await.unwrap().status, RequestStatus::Rejected);
        assert_eq!(
            view.cache().get(QueryKey::Request(5)),
            Some(Cached::Request(dto(5, RequestStatus::Rejected)))
        );
    }

    #[tokio::test]
    async fn test_failed_status_change_surfaces_and_invalidates() {
        let server = MockServer::start().await;
        let view = RequestsView::new(signed_in(&server, &["ROLE_AGENT"]), QueryCache::new());

        mount_get(&server, "/api/requests/5", dto(5, RequestStatus::Pending)).await;
        view.request(5).await.unwrap();

        Mock::given(method("PATCH"))
            .and(path("/api/requests/5/status"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        assert!(matches!(
            view.change_status(5, RequestStatus::InProgress).await,
            Err(ClientError::Backend { status: 500, .. })
        ));
        assert_eq!(view.cache().get(QueryKey::Request(5)), None);
        assert_eq!(view.request(5).await.unwrap().status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_invalidates_listings() {
        let server = MockServer::start().await;
        let view = RequestsView::new(signed_in(&server, &["ROLE_USER"]), QueryCache::new());

        Mock::given(method("GET"))
            .and(path("/api/requests/mine"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Total-Count", "2")
                    .set_body_json(vec![dto(1, RequestStatus::Pending), dto(2, RequestStatus::Pending)]),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/requests/2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (filter, page) = (RequestFilter::default(), PageRequest::default());
        let listing = QueryId::listing(QueryKey::MyRequests, &filter, &page);
        assert_eq!(view.mine(&filter, &page).await.unwrap().total, 2);
        assert!(view.cache().get(listing.clone()).is_some());

        view.delete(2).await.unwrap();
        assert_eq!(view.cache().get(listing), None);
        assert_eq!(view.cache().get(QueryKey::Stats), None);
    }
}
