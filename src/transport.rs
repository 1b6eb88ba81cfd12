use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Seam between the orchestration core and actual network I/O. Lets tests
/// swap in a recording fake.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// reqwest-backed transport with bounded retry on connection errors.
pub struct HttpTransport {
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("finfeed/0.2")
            .build()?;
        Ok(Self {
            client,
            retries: 2,
            retry_delay_ms: 500,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = with_retry(
            || self.client.get(url).send(),
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .map_err(|e| anyhow!("Request error: {e} for URL: {url}"))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for URL: {url}", response.status()));
        }

        debug!(url, "Received upstream response");
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON response from {url}: {e}"))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": 64000})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let value = transport
            .get_json(&format!("{}/simple/price", server.uri()))
            .await
            .unwrap();
        assert_eq!(value, json!({"bitcoin": 64000}));
    }

    #[tokio::test]
    async fn test_get_json_http_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let result = transport
            .get_json(&format!("{}/simple/price", server.uri()))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("429"));
    }
}
