//! HTTP client for the Converse REST API.
//!
//! `ApiClient` wraps a shared `reqwest::Client` with bearer-token
//! attachment and one-shot 401 recovery: a rejected request triggers a
//! forced token renewal and is reissued at most once. Login is exempt
//! from the retry path so credential errors reach the caller untouched.

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::auth::manager::Navigator;
use crate::auth::{TokenManager, TokenStore};
use crate::config::ApiConfig;
use crate::models::auth::{LoginRequest, TokenGrant, UserProfile};
use crate::models::chat::{ChatReply, ChatRequest, Conversation, ConversationDetail};
use crate::models::ApiEnvelope;
use crate::stream::{consume, StreamHandler};

use super::ApiError;

/// API client for the Converse backend.
/// Clone is cheap - `reqwest::Client` uses Arc internally for connection
/// pooling, and the token manager is shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    tokens: TokenManager,
}

impl ApiClient {
    pub fn new(config: ApiConfig, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        Self::build(config, store, None)
    }

    /// Like [`ApiClient::new`], with a host navigation hook invoked on
    /// session invalidation.
    pub fn with_navigator(
        config: ApiConfig,
        store: Arc<dyn TokenStore>,
        navigator: Box<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        Self::build(config, store, Some(navigator))
    }

    fn build(
        config: ApiConfig,
        store: Arc<dyn TokenStore>,
        navigator: Option<Box<dyn Navigator>>,
    ) -> anyhow::Result<Self> {
        // No client-level timeout: the chat stream must be able to outlive
        // any fixed deadline. Non-streaming requests set one per call.
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let tokens =
            TokenManager::with_client(client.clone(), config.clone(), store, navigator);
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// The shared credential lifecycle manager.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    // ===== Auth operations =====

    /// Authenticate with email and password, storing the granted pair.
    ///
    /// Deliberately not routed through the 401 retry path: a login
    /// rejection is a credential error the caller must see as-is, not a
    /// session to renew.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenGrant, ApiError> {
        let url = self.config.auth_url("/login");
        let response = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(credentials)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let envelope: ApiEnvelope<TokenGrant> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let grant = envelope.data;
        if grant.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "login response carried no access token".to_string(),
            ));
        }
        self.tokens
            .persist_grant(&grant)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        Ok(grant)
    }

    /// End the session server-side and clear local credentials.
    pub async fn logout(&self) {
        self.tokens.logout().await;
    }

    /// Fetch the authenticated user's profile.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let envelope: ApiEnvelope<UserProfile> =
            self.get(&self.config.auth_url("/me")).await?;
        Ok(envelope.data)
    }

    // ===== Chat operations =====

    /// List the user's conversations.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let envelope: ApiEnvelope<Vec<Conversation>> =
            self.get(&self.config.chat_url("/sessions")).await?;
        Ok(envelope.data)
    }

    /// Fetch one conversation with its message history.
    pub async fn conversation_detail(
        &self,
        session_id: &str,
    ) -> Result<ConversationDetail, ApiError> {
        let url = self.config.chat_url(&format!("/sessions/{session_id}"));
        let envelope: ApiEnvelope<ConversationDetail> = self.get(&url).await?;
        Ok(envelope.data)
    }

    /// Send a message without streaming the reply.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let envelope: ApiEnvelope<ChatReply> =
            self.post(&self.config.chat_url(""), request).await?;
        Ok(envelope.data)
    }

    /// Open the chat completion stream for `request`.
    ///
    /// A valid access token is obtained (renewing if needed) before the
    /// stream is opened, and a 401 on open is retried once after a forced
    /// renewal. The returned byte stream is raw; feed it to
    /// [`crate::stream::consume`] or use [`ApiClient::stream_chat`].
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>, ApiError> {
        let url = self.config.chat_url("/stream");
        let mut retried = false;
        loop {
            let Some(token) = self.tokens.get_valid_token().await else {
                return Err(ApiError::Unauthorized);
            };
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(request)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                debug!("stream open rejected with 401; renewing token");
                if self.tokens.force_renew().await.is_some() {
                    continue;
                }
            }
            let response = Self::check_response(response).await?;
            return Ok(response.bytes_stream());
        }
    }

    /// Send a chat message and decode the streamed reply into `handler`.
    ///
    /// Errors out only if the stream cannot be opened; once open, all
    /// outcomes are delivered through the handler callbacks.
    pub async fn stream_chat<H: StreamHandler>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
    ) -> Result<(), ApiError> {
        let stream = self.open_stream(request).await?;
        consume(stream, handler).await;
        Ok(())
    }

    // ===== Request plumbing =====

    /// Issue an authenticated request, renewing the token and retrying
    /// once if the server answers 401. The token attached on first issue
    /// is whatever the store holds - validation happens reactively on
    /// rejection, sparing a renewal round-trip per request.
    async fn send_authorized<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut retried = false;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(self.config.request_timeout);
            if let Some(body) = body {
                request = request.json(body);
            }
            if let Some(token) = self.tokens.current_token() {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                debug!(url, "request rejected with 401; renewing token");
                if self.tokens.force_renew().await.is_some() {
                    continue;
                }
                // Renewal failed - fall through and surface the 401.
            }
            return Ok(response);
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .send_authorized::<()>(Method::GET, url, None)
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send_authorized(Method::POST, url, Some(body))
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Check if a response is successful, classifying the failure with its
    /// body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::claims::testing::token_expiring_at;
    use crate::auth::MemoryTokenStore;
    use crate::stream::{SessionInfo, StreamError};

    fn fresh_token() -> String {
        token_expiring_at(Utc::now().timestamp() + 3600)
    }

    fn seeded_client(server: &MockServer) -> (ApiClient, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        store.store_access(&fresh_token()).expect("seed access");
        store.store_refresh("r1").expect("seed refresh");
        let client =
            ApiClient::new(ApiConfig::new(server.uri()), store.clone()).expect("client");
        (client, store)
    }

    fn grant_response(access: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "data": { "access_token": access } }))
    }

    #[tokio::test]
    async fn list_conversations_attaches_bearer_token() {
        let server = MockServer::start().await;
        let (client, store) = seeded_client(&server);
        let token = store.access_token().expect("seeded token");

        Mock::given(method("GET"))
            .and(path("/api/v1/chat/sessions"))
            .and(header("authorization", format!("Bearer {token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "s1", "title": "First chat", "created_at": "2024-01-01" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let conversations = client.list_conversations().await.expect("list");
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, "s1");
        assert_eq!(conversations[0].title, "First chat");
    }

    #[tokio::test]
    async fn rejected_request_is_renewed_and_retried_once() {
        let server = MockServer::start().await;
        let (client, store) = seeded_client(&server);
        let renewed = fresh_token();

        // First attempt is rejected despite a locally-valid token
        Mock::given(method("GET"))
            .and(path("/api/v1/chat/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(grant_response(&renewed))
            .expect(1)
            .mount(&server)
            .await;
        // Retry carries the renewed token
        Mock::given(method("GET"))
            .and(path("/api/v1/chat/sessions"))
            .and(header("authorization", format!("Bearer {renewed}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let conversations = client.list_conversations().await.expect("list after renew");
        assert!(conversations.is_empty());
        assert_eq!(store.access_token().as_deref(), Some(renewed.as_str()));
    }

    #[tokio::test]
    async fn second_rejection_surfaces_without_another_retry() {
        let server = MockServer::start().await;
        let (client, _store) = seeded_client(&server);

        Mock::given(method("GET"))
            .and(path("/api/v1/chat/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2) // original + single retry, never a third
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(grant_response(&fresh_token()))
            .expect(1)
            .mount(&server)
            .await;

        let result = client.list_conversations().await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn login_rejection_is_not_intercepted() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::default());
        let client =
            ApiClient::new(ApiConfig::new(server.uri()), store).expect("client");

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = client
            .login(&LoginRequest {
                email: "user@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        // No renewal was attempted
        let requests = server.received_requests().await.expect("request recording");
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn login_persists_granted_pair() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::default());
        let client =
            ApiClient::new(ApiConfig::new(server.uri()), store.clone()).expect("client");
        let access = fresh_token();

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "access_token": access, "refresh_token": "r1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client
            .login(&LoginRequest {
                email: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            })
            .await
            .expect("login");
        assert_eq!(grant.access_token, access);
        assert_eq!(store.access_token().as_deref(), Some(access.as_str()));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn login_without_access_token_is_rejected() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::default());
        let client =
            ApiClient::new(ApiConfig::new(server.uri()), store.clone()).expect("client");

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
            .mount(&server)
            .await;

        let result = client
            .login(&LoginRequest {
                email: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
        assert!(store.access_token().is_none());
    }

    #[derive(Default)]
    struct Collector {
        events: Vec<String>,
    }

    impl StreamHandler for Collector {
        fn on_session_info(&mut self, info: SessionInfo) {
            self.events.push(format!("session:{}", info.session_id));
        }

        fn on_chunk(&mut self, text: &str) {
            self.events.push(format!("chunk:{text}"));
        }

        fn on_complete(&mut self) {
            self.events.push("complete".to_string());
        }

        fn on_error(&mut self, error: StreamError) {
            self.events.push(format!("error:{error}"));
        }
    }

    #[tokio::test]
    async fn stream_chat_decodes_full_reply() {
        let server = MockServer::start().await;
        let (client, _store) = seeded_client(&server);

        let body = concat!(
            "data: {\"session_id\":\"s1\",\"title\":\"T\",\"created_at\":\"2024-01-01\"}\n",
            "data: {\"content\":\"Hello\"}\n",
            "data: {\"content\":\" world\"}\n",
            "data: [DONE]\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut handler = Collector::default();
        client
            .stream_chat(&ChatRequest::new("hi"), &mut handler)
            .await
            .expect("stream");
        assert_eq!(
            handler.events,
            vec!["session:s1", "chunk:Hello", "chunk: world", "complete"]
        );
    }

    #[tokio::test]
    async fn stream_open_requires_a_credential() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::default());
        let client =
            ApiClient::new(ApiConfig::new(server.uri()), store).expect("client");

        let result = client.open_stream(&ChatRequest::new("hi")).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(server
            .received_requests()
            .await
            .expect("request recording")
            .is_empty());
    }
}
