//! # HTTP Remote Client
//!
//! [`RemoteClient`] over `reqwest`: JSON bodies, optional bearer token,
//! endpoints joined onto the configured base URL.
//!
//! ```text
//!   status      → result
//!   ─────────     ──────────────────────────
//!   2xx          body as JSON (empty → null)
//!   401, 403     Authentication
//!   400, 422     Validation
//!   404          NotFound
//!   409          Conflict
//!   5xx          Server        (retryable)
//!   other        Status
//!   no answer    Network / Timeout (retryable)
//! ```

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::Value;
use std::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::config::ApiSettings;
use crate::error::{ApiError, ApiResult, SyncError, SyncResult};
use crate::remote::RemoteClient;

const USER_AGENT: &str = concat!("pdv-agent/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in messages.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug)]
pub struct HttpRemoteClient {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpRemoteClient {
    pub fn new(settings: &ApiSettings) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpRemoteClient {
            client,
            base_url: settings.base_url()?,
            token: RwLock::new(settings.token.clone().filter(|t| !t.is_empty())),
        })
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// `/products/12` under `https://host/api/v1/` → `https://host/api/v1/products/12`.
    pub fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| ApiError::Network(format!("bad endpoint {endpoint}: {e}")))
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> ApiResult<Value> {
        let url = self.endpoint_url(endpoint)?;
        debug!(method = %method, url = %url, "API request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = payload {
            request = request.json(body);
        }
        let token = self
            .token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(method = %method, endpoint, status = status.as_u16(), "API response");

        classify_status(status, &body)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::InvalidResponse(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

fn error_message(body: &str) -> String {
    // prefer the API's own message field when there is one
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "message", "error"].iter().find_map(|key| {
            v.get(key)
                .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
        })
    });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    message.chars().take(ERROR_BODY_LIMIT).collect()
}

/// Maps a non-success status to its [`ApiError`] category.
pub fn classify_status(status: StatusCode, body: &str) -> ApiResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    let message = error_message(body);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Authentication {
            status: code,
            message,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation {
            status: code,
            message,
        },
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        s if s.is_server_error() => ApiError::Server { status: code },
        _ => ApiError::Status {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get(&self, endpoint: &str) -> ApiResult<Value> {
        self.request(Method::GET, endpoint, None).await
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> ApiResult<Value> {
        self.request(Method::POST, endpoint, Some(payload)).await
    }

    async fn put(&self, endpoint: &str, payload: &Value) -> ApiResult<Value> {
        self.request(Method::PUT, endpoint, Some(payload)).await
    }

    async fn delete(&self, endpoint: &str) -> ApiResult<Value> {
        self.request(Method::DELETE, endpoint, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, token: Option<&str>) -> HttpRemoteClient {
        HttpRemoteClient::new(&ApiSettings {
            base_url: base_url.to_string(),
            timeout: 5.0,
            token: token.map(str::to_string),
            ..ApiSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::CREATED, "").is_ok());
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            Err(ApiError::Authentication { status: 403, .. })
        ));
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":"sku already used"}"#),
            Err(ApiError::Validation {
                status: 422,
                message: "sku already used".into()
            })
        );
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, "dup"),
            Err(ApiError::Conflict(m)) if m == "dup"
        ));
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "<html>"),
            Err(ApiError::Server { status: 502 })
        );
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(ApiError::Status { status: 429, .. })
        ));
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let remote = client("https://erp.example.com/api/v1", None);
        assert_eq!(
            remote.endpoint_url("/products/12").unwrap().as_str(),
            "https://erp.example.com/api/v1/products/12"
        );
        assert_eq!(
            remote.endpoint_url("sales").unwrap().as_str(),
            "https://erp.example.com/api/v1/sales"
        );
    }

    #[test]
    fn test_token_management() {
        let remote = client("http://localhost:8000", Some(""));
        assert!(!remote.is_authenticated());
        remote.set_token("abc");
        assert!(remote.is_authenticated());
        remote.clear_token();
        assert!(!remote.is_authenticated());
    }

    #[tokio::test]
    async fn test_post_sends_json_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/customers"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_json(json!({ "name": "Maria" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 77 })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = client(&format!("{}/api/v1", server.uri()), Some("secret-token"));
        let body = remote
            .post("/customers", &json!({ "name": "Maria" }))
            .await
            .unwrap();
        assert_eq!(body["id"], 77);
    }

    #[tokio::test]
    async fn test_put_targets_the_remote_row() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/products/1001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1001 })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = client(&format!("{}/api/v1", server.uri()), None);
        let body = remote
            .put("/products/1001", &json!({ "price": 3.99 }))
            .await
            .unwrap();
        assert_eq!(body["id"], 1001);
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sales/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let remote = client(&server.uri(), None);
        assert_eq!(remote.delete("/sales/3").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({ "detail": "document already registered" })),
            )
            .mount(&server)
            .await;

        let remote = client(&server.uri(), None);
        let err = remote.get("/products").await.unwrap_err();
        assert_eq!(err, ApiError::Server { status: 503 });
        assert!(err.is_retryable());

        let err = remote.post("/customers", &json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Validation {
                status: 422,
                message: "document already registered".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let remote = client(&server.uri(), None);
        assert!(matches!(
            remote.get("/customers").await,
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = client(&format!("http://{addr}"), None);
        assert!(!remote.health_check().await);
        assert!(matches!(
            remote.get("/products").await,
            Err(ApiError::Network(_))
        ));
    }
}
