use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use gameap_config::DaemonConfig;
use gameap_core::{ApiError, ApiRequest, ApiRequestMaker, ApiResponse};

const TOKEN_PATH: &str = "/gdaemon_api/get_token";

/// Token refreshes allowed per request.
const MAX_ACTUALIZE_COUNT: u8 = 1;

pub const MAX_TRANSPORT_RETRIES: u32 = 30;
const RETRY_BASE_WAIT: Duration = Duration::from_millis(200);
const RETRY_MAX_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TokenMessage {
    token: String,
    #[serde(default)]
    timestamp: i64,
}

/// Panel API client authenticated with a short lived token.
///
/// The token is obtained with the node API key and renewed when the panel
/// answers 401. Only one renewal runs at a time; a concurrent caller gets
/// [`ApiError::ActualizeTokenLocked`].
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    token: RwLock<String>,
    api_server_time: RwLock<Option<DateTime<Utc>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    retry_base_wait: Duration,
}

impl ApiClient {
    pub fn new(client: reqwest::Client, cfg: &DaemonConfig) -> Self {
        Self {
            client,
            base_url: cfg.api_base_url(),
            api_key: cfg.api_key.clone(),
            token: RwLock::new(String::new()),
            api_server_time: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            retry_base_wait: RETRY_BASE_WAIT,
        }
    }

    /// Creates the client and fetches the first token.
    pub async fn connect(client: reqwest::Client, cfg: &DaemonConfig) -> Result<Self, ApiError> {
        let api = Self::new(client, cfg);
        api.actualize_token().await?;
        Ok(api)
    }

    #[cfg(test)]
    pub(crate) fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_base_wait = wait;
        self
    }

    pub fn api_server_time(&self) -> Option<DateTime<Utc>> {
        *self.api_server_time.read()
    }

    pub async fn actualize_token(&self) -> Result<(), ApiError> {
        let _guard = self
            .refresh_lock
            .try_lock()
            .map_err(|_| ApiError::ActualizeTokenLocked)?;

        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let response = self
            .send_with_retries(|| {
                self.client
                    .get(&url)
                    .header("Content-Type", "application/json")
                    .bearer_auth(&self.api_key)
            })
            .await
            .map_err(|e| ApiError::TokenRequest(e.to_string()))?;

        if !response.is_success() {
            return Err(response.invalid());
        }

        let message: TokenMessage = response.json()?;

        *self.token.write() = message.token;
        *self.api_server_time.write() = Utc.timestamp_opt(message.timestamp, 0).single();

        debug!(log_type = "api_client", "API token actualized");

        Ok(())
    }

    fn build(&self, request: &ApiRequest, method: &Method) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, request.resolved_url());

        let mut builder = self
            .client
            .request(method.clone(), url)
            .header("Content-Type", "application/json")
            .header("X-Auth-Token", self.token.read().as_str());

        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder
    }

    /// Sends the request, retrying while the panel answers 429 or 502.
    async fn send_with_retries<F>(&self, make: F) -> Result<ApiResponse, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            let response = make()
                .send()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;

            let status = response.status();
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::BAD_GATEWAY;

            if retryable && attempt < MAX_TRANSPORT_RETRIES {
                attempt += 1;
                let wait = self
                    .retry_base_wait
                    .saturating_mul(attempt)
                    .min(RETRY_MAX_WAIT);
                debug!(
                    log_type = "api_client",
                    "API responded {}, retry {} in {:?}", status, attempt, wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;

            return Ok(ApiResponse::new(status.as_u16(), body));
        }
    }
}

#[async_trait]
impl ApiRequestMaker for ApiClient {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = match request.method.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            other => return Err(ApiError::InvalidRequestMethod(other.to_string())),
        };

        let mut actualized = 0;

        loop {
            let response = self
                .send_with_retries(|| self.build(&request, &method))
                .await?;

            debug!(
                log_type = "api_client",
                method = %method,
                url = %request.resolved_url(),
                status = response.status,
                "API request"
            );

            if response.status == StatusCode::UNAUTHORIZED.as_u16()
                && actualized < MAX_ACTUALIZE_COUNT
            {
                warn!(log_type = "api_client", "Invalid token, actualizing token");
                self.actualize_token().await?;
                actualized += 1;
                continue;
            }

            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers each connection with the next canned `(status, body)` and records request heads.
    async fn panel(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut byte = [0u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    if stream.read(&mut byte).await.unwrap() == 0 {
                        break;
                    }
                    head.push(byte[0]);
                }
                let head = String::from_utf8_lossy(&head).into_owned();

                let length = head
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                let mut request_body = vec![0u8; length];
                stream.read_exact(&mut request_body).await.unwrap();

                seen.lock().push(head);

                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (format!("http://{}", addr), requests)
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn config(api_host: String) -> DaemonConfig {
        DaemonConfig {
            node_id: 1,
            api_host,
            api_key: "node-key".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unauthorized_response_renews_token_once() {
        let (host, requests) = panel(vec![
            (200, r#"{"token":"first","timestamp":1625000000}"#),
            (401, r#"{"message":"Unauthorized"}"#),
            (200, r#"{"token":"second","timestamp":1625000100}"#),
            (200, r#"[1,2]"#),
        ])
        .await;

        let api = ApiClient::connect(http(), &config(host))
            .await
            .unwrap();
        assert_eq!(api.api_server_time().map(|t| t.timestamp()), Some(1625000000));

        let response = api
            .request(ApiRequest::get("/gdaemon_api/servers"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "[1,2]");

        let requests = requests.lock();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].starts_with("GET /gdaemon_api/get_token"));
        assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer node-key"));
        assert!(requests[1].to_ascii_lowercase().contains("x-auth-token: first"));
        assert!(requests[3].to_ascii_lowercase().contains("x-auth-token: second"));
    }

    #[tokio::test]
    async fn throttled_requests_are_retried() {
        let (host, requests) = panel(vec![
            (429, "{}"),
            (502, "{}"),
            (200, r#"{"id":3}"#),
        ])
        .await;

        let api = ApiClient::new(http(), &config(host))
            .with_retry_wait(Duration::from_millis(1));

        let response = api
            .request(
                ApiRequest::get("/gdaemon_api/servers/{id}")
                    .with_path_param("id", 3)
                    .with_query("append", "status_num"),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let requests = requests.lock();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].starts_with("GET /gdaemon_api/servers/3?append=status_num"));
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let api = ApiClient::new(http(), &config("http://127.0.0.1:9".to_string()));

        let err = api
            .request(ApiRequest::new("DELETE", "/gdaemon_api/tasks/1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidRequestMethod(m) if m == "DELETE"));
    }
}
