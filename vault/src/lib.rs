use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use registry::{KeyLoader, OnDemand, Scheduler};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use utils::error::Result;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Lightweight structure specifically for extracting the value field
#[derive(Debug, Deserialize)]
struct SecretValue {
    value: String,
}

#[derive(Debug, Clone)]
pub struct VaultClient {
    pub domain: String,
    pub api_key: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    client: Client,
}

impl VaultClient {
    pub fn new(domain: String, api_key: String) -> Self {
        let client = Client::new();

        Self {
            domain,
            api_key,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Fetch one secret by name.
    ///
    /// Returns `Ok(None)` for secrets that are absent (404) or forbidden
    /// (403); transport failures and 5xx responses retry up to
    /// `max_retries` times before surfacing an error. Secret values never
    /// appear in logs, only names do.
    pub async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        let start_time = Instant::now();
        let url = format!("{}/v1/secrets/{}", self.domain, name);
        let auth_header = format!("Bearer api-{}", self.api_key);

        for attempt in 0..=self.max_retries {
            let response = self
                .client
                .get(&url)
                .header("Authorization", &auth_header)
                .timeout(Duration::from_secs(self.timeout_secs))
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        log_request_duration(name, start_time, "completed");
                        return parse_secret_response(resp).await.map(Some);
                    } else if status == StatusCode::NOT_FOUND
                        || status == StatusCode::FORBIDDEN
                    {
                        log_request_duration(name, start_time, &format!("absent ({})", status));
                        return Ok(None);
                    } else if should_retry(status, attempt, self.max_retries) {
                        warn!(
                            "Request failed with status {}, retrying... (attempt {}/{})",
                            status,
                            attempt + 1,
                            self.max_retries + 1
                        );
                        continue;
                    } else {
                        log_request_duration(
                            name,
                            start_time,
                            &format!("failed with status: {}", status),
                        );
                        return Err(create_status_error(status, self.max_retries));
                    }
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!(
                            "Request failed with error: {}, retrying... (attempt {}/{})",
                            e,
                            attempt + 1,
                            self.max_retries + 1
                        );
                        continue;
                    } else {
                        log_request_duration(name, start_time, &format!("failed with error: {}", e));
                        return Err(format!(
                            "Request failed after {} retries: {}",
                            self.max_retries, e
                        )
                        .into());
                    }
                }
            }
        }

        unreachable!("Loop should have returned or continued")
    }
}

fn log_request_duration(name: &str, start_time: Instant, status: &str) {
    let elapsed = start_time.elapsed();
    let duration_secs = elapsed.as_secs_f64();

    if elapsed >= Duration::from_secs(2) {
        info!(
            "Vault request for secret '{}' {} in {:.2}s",
            name, status, duration_secs
        );
    } else {
        debug!(
            "Vault request for secret '{}' {} in {:.2}s",
            name, status, duration_secs
        );
    }
}

async fn parse_secret_response(resp: reqwest::Response) -> Result<String> {
    let secret: SecretValue = resp
        .json()
        .await
        .map_err(|e| format!("Failed to parse JSON response: {}", e))?;

    Ok(secret.value)
}

fn should_retry(status: StatusCode, attempt: u32, max_retries: u32) -> bool {
    status.as_u16() >= 500 && attempt < max_retries
}

fn create_status_error(status: StatusCode, max_retries: u32) -> utils::error::Error {
    if status.as_u16() >= 500 {
        format!("Server error after {} retries: {}", max_retries, status).into()
    } else {
        format!("Client error: {}", status).into()
    }
}

/// [`KeyLoader`] delegating to a [`VaultClient`]; secrets materialize one
/// name at a time.
pub struct VaultLoader {
    id: String,
    client: VaultClient,
}

impl VaultLoader {
    pub fn new(id: impl Into<String>, client: VaultClient) -> Self {
        VaultLoader {
            id: id.into(),
            client,
        }
    }
}

#[async_trait]
impl KeyLoader for VaultLoader {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_key(&self, key: &str) -> Result<Option<String>> {
        self.client.get_secret(key).await
    }
}

/// The vault as a lazily-loading registry source with single-flight
/// semantics per secret name.
pub fn vault_source(
    id: impl Into<String>,
    client: VaultClient,
    scheduler: Arc<Scheduler>,
) -> OnDemand<VaultLoader> {
    OnDemand::new(VaultLoader::new(id, client), scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    #[tokio::test]
    async fn test_vault_client_creation() {
        let client = VaultClient::new("http://127.0.0.1:7893".to_string(), "test-key".to_string());

        assert_eq!(client.domain, "http://127.0.0.1:7893");
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(client.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let client_custom =
            VaultClient::new("http://example.com".to_string(), "custom-key".to_string())
                .with_max_retries(5)
                .with_timeout_secs(10);

        assert_eq!(client_custom.max_retries, 5);
        assert_eq!(client_custom.timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_get_secret_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/db-password"))
            .and(header("Authorization", "Bearer api-test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": "hunter2"})),
            )
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string());

        let result = client.get_secret("db-password").await.unwrap();
        assert_eq!(result.as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_absent_secret_maps_to_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string());

        assert_eq!(client.get_secret("missing").await.unwrap(), None);
        assert_eq!(client.get_secret("forbidden").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_with_retry() {
        let mock_server = MockServer::start().await;

        let max_retries = DEFAULT_MAX_RETRIES;
        let total_attempts = max_retries + 1; // initial attempt + retries

        Mock::given(method("GET"))
            .and(path("/v1/secrets/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .expect(total_attempts as u64)
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string());

        let result = client.get_secret("flaky").await;
        assert!(result.is_err());

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains(&format!("Server error after {} retries: 500", max_retries)));
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/retry-success"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/retry-success"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": "ok"})),
            )
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string());

        let result = client.get_secret("retry-success").await.unwrap();
        assert_eq!(result.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("invalid json"))
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string());

        let result = client.get_secret("broken").await;
        assert!(result.is_err());

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("Failed to parse JSON response"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/secrets/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"value": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = VaultClient::new(mock_server.uri(), "test-key".to_string())
            .with_timeout_secs(1)
            .with_max_retries(0);

        let result = client.get_secret("slow").await;
        assert!(result.is_err());
    }
}
