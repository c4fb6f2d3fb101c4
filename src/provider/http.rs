//! REST client for a Maskinporten-style scope administration API.
//!
//! Endpoints (relative to the configured base URL):
//!
//! | Operation | Request |
//! |---|---|
//! | list | `GET /api/v1/scopes/all?inactive=true` |
//! | register | `POST /api/v1/scopes` |
//! | update / activate | `PUT /api/v1/scopes?scope={name}` |
//! | delete | `DELETE /api/v1/scopes?scope={name}` |
//! | ACL | `GET /api/v1/scopes/access?scope={name}` |
//! | add consumer | `PUT /api/v1/scopes/access/{orgno}?scope={name}` |
//! | deactivate consumer | `DELETE /api/v1/scopes/access/{orgno}?scope={name}` |

use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{ProviderError, ProviderOperation, ProviderResult, ScopeProvider, retry::with_retry};
use crate::{
    config::{ProviderConfig, RetryConfig},
    models::{ConsumerRegistration, ScopeRegistration, ScopeRegistrationRequest},
};

const SCOPES_PATH: [&str; 3] = ["api", "v1", "scopes"];

/// HTTP implementation of [`ScopeProvider`].
///
/// Requests carry a static bearer token when one is configured. Transport
/// failures, 429 and 5xx responses are retried per [`RetryConfig`]; scope
/// registration is never retried since it is not idempotent.
#[derive(Clone)]
pub struct HttpScopeProvider {
    http_client: Client,
    base_url: Url,
    auth_token: Option<String>,
    retry_config: RetryConfig,
}

impl HttpScopeProvider {
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let base_url = Url::parse(&config.endpoint)
            .map_err(|e| ProviderError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidEndpoint(config.endpoint.clone()));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            auth_token: config.auth_token.clone(),
            retry_config: config.retry.clone(),
        })
    }

    fn endpoint(&self, extra_segments: &[&str], query: &[(&str, &str)]) -> ProviderResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(SCOPES_PATH)
            .extend(extra_segments);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: ProviderOperation,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> ProviderResult<T> {
        let retry_config = match operation {
            ProviderOperation::RegisterScope => self.retry_config.for_registration(),
            _ => Cow::Borrowed(&self.retry_config),
        };

        let response = with_retry(&retry_config, operation.as_str(), || {
            let mut request = self.http_client.request(method.clone(), url.clone());
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            request.send()
        })
        .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Conflict(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    fn payload(payload: &ScopeRegistrationRequest) -> ProviderResult<serde_json::Value> {
        serde_json::to_value(payload)
            .map_err(|e| ProviderError::Unavailable(format!("encoding scope payload: {e}")))
    }
}

#[async_trait]
impl ScopeProvider for HttpScopeProvider {
    async fn list_scopes(&self, prefix: &str) -> ProviderResult<Vec<ScopeRegistration>> {
        let url = self.endpoint(&["all"], &[("inactive", "true")])?;
        let scopes: Vec<ScopeRegistration> = self
            .send(ProviderOperation::ListScopes, Method::GET, url, None)
            .await?;

        Ok(scopes.into_iter().filter(|s| s.prefix == prefix).collect())
    }

    async fn get_scope_acl(&self, scope: &str) -> ProviderResult<Vec<ConsumerRegistration>> {
        let url = self.endpoint(&["access"], &[("scope", scope)])?;
        self.send(ProviderOperation::GetScopeAcl, Method::GET, url, None)
            .await
    }

    async fn add_to_scope_acl(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration> {
        let url = self.endpoint(&["access", consumer], &[("scope", scope)])?;
        self.send(ProviderOperation::AddToScopeAcl, Method::PUT, url, None)
            .await
    }

    async fn deactivate_consumer(
        &self,
        scope: &str,
        consumer: &str,
    ) -> ProviderResult<ConsumerRegistration> {
        let url = self.endpoint(&["access", consumer], &[("scope", scope)])?;
        self.send(
            ProviderOperation::DeactivateConsumer,
            Method::DELETE,
            url,
            None,
        )
        .await
    }

    async fn register_scope(
        &self,
        payload: &ScopeRegistrationRequest,
    ) -> ProviderResult<ScopeRegistration> {
        let url = self.endpoint(&[], &[])?;
        self.send(
            ProviderOperation::RegisterScope,
            Method::POST,
            url,
            Some(Self::payload(payload)?),
        )
        .await
    }

    async fn update_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration> {
        let url = self.endpoint(&[], &[("scope", scope)])?;
        self.send(
            ProviderOperation::UpdateScope,
            Method::PUT,
            url,
            Some(Self::payload(payload)?),
        )
        .await
    }

    async fn activate_scope(
        &self,
        payload: &ScopeRegistrationRequest,
        scope: &str,
    ) -> ProviderResult<ScopeRegistration> {
        let url = self.endpoint(&[], &[("scope", scope)])?;
        self.send(
            ProviderOperation::ActivateScope,
            Method::PUT,
            url,
            Some(Self::payload(&payload.activation())?),
        )
        .await
    }

    async fn delete_scope(&self, scope: &str) -> ProviderResult<ScopeRegistration> {
        let url = self.endpoint(&[], &[("scope", scope)])?;
        self.send(ProviderOperation::DeleteScope, Method::DELETE, url, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    use super::*;
    use crate::models::{ConsumerState, DeclaredScope, OwnerRef};

    fn provider_for(server: &MockServer) -> HttpScopeProvider {
        let config = ProviderConfig {
            endpoint: server.uri(),
            auth_token: Some("test-token".into()),
            timeout_secs: 5,
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                jitter: 0.0,
                ..Default::default()
            },
        };
        HttpScopeProvider::new(&config).unwrap()
    }

    fn registration_json(name: &str, active: bool) -> serde_json::Value {
        let (prefix, subscope) = name.split_once(':').unwrap();
        json!({
            "name": name,
            "prefix": prefix,
            "subscope": subscope,
            "description": "Read orders",
            "active": active,
            "allowed_integration_types": []
        })
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = ProviderConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpScopeProvider::new(&config),
            Err(ProviderError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_endpoint_encodes_consumer_and_scope() {
        let config = ProviderConfig {
            endpoint: "https://provider.example.com/base/".into(),
            ..Default::default()
        };
        let provider = HttpScopeProvider::new(&config).unwrap();
        let url = provider
            .endpoint(&["access", "999888777"], &[("scope", "prod:read")])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://provider.example.com/base/api/v1/scopes/access/999888777?scope=prod%3Aread"
        );
    }

    #[tokio::test]
    async fn test_list_scopes_filters_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/scopes/all"))
            .and(query_param("inactive", "true"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                registration_json("prod:read", true),
                registration_json("dev:read", true),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let scopes = provider_for(&server).list_scopes("prod").await.unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].name, "prod:read");
    }

    #[tokio::test]
    async fn test_activate_sends_active_flag() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/scopes"))
            .and(query_param("scope", "prod:read"))
            .and(body_partial_json(json!({ "active": true, "subscope": "read" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(registration_json("prod:read", true)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = ScopeRegistrationRequest::from_declared(
            "prod",
            &OwnerRef::new("team-a", "orders-api"),
            &DeclaredScope::new("read"),
        );
        let registration = provider_for(&server)
            .activate_scope(&payload, "prod:read")
            .await
            .unwrap();
        assert!(registration.active);
    }

    #[tokio::test]
    async fn test_add_consumer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/scopes/access/999888777"))
            .and(query_param("scope", "prod:read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "scope": "prod:read",
                "consumer_orgno": "999888777",
                "state": "APPROVED"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registration = provider_for(&server)
            .add_to_scope_acl("prod:read", "999888777")
            .await
            .unwrap();
        assert_eq!(registration.state, ConsumerState::Approved);
    }

    #[tokio::test]
    async fn test_not_found_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/scopes"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .delete_scope("prod:missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/scopes/access"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(2)
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .get_scope_acl("prod:read")
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/scopes"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ScopeRegistrationRequest::from_declared(
            "prod",
            &OwnerRef::new("team-a", "orders-api"),
            &DeclaredScope::new("read"),
        );
        let err = provider_for(&server)
            .register_scope(&payload)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 503, .. }));
    }
}
