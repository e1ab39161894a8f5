//! REST driver
//!
//! Talks to a remote token-authenticated KV HTTP service. The service
//! exposes command paths (`get`, `set`, `del`) with the key as a query
//! parameter and answers with a `{"result": ...}` envelope; an absent
//! key is a well-formed `{"result": null}`, not an HTTP error.

use crate::config::{HttpConfig, RestConfig};
use crate::driver::KvDriver;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct CommandResponse {
    result: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetBody<'a> {
    value: &'a str,
}

/// Driver for the remote KV HTTP service.
///
/// Stateless per call; the only shared state is the connection pool
/// inside [`reqwest::Client`].
pub struct RestDriver {
    endpoint: String,
    token: String,
    http_client: Client,
}

impl RestDriver {
    /// Create a driver for the configured endpoint.
    pub fn new(config: &RestConfig, http: &HttpConfig) -> StorageResult<Self> {
        let http_client = Client::builder()
            .connect_timeout(http.connect_timeout)
            .timeout(http.request_timeout)
            .build()
            .map_err(|err| {
                StorageError::transport(format!("failed to build HTTP client: {}", err))
            })?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http_client,
        })
    }

    fn command_url(&self, command: &str) -> String {
        format!("{}/{}", self.endpoint, command)
    }

    async fn parse_result(response: reqwest::Response) -> StorageResult<Option<String>> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CommandResponse = response
            .json()
            .await
            .map_err(|err| StorageError::transport(err.without_url().to_string()))?;
        Ok(body.result)
    }
}

#[async_trait]
impl KvDriver for RestDriver {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let response = self
            .http_client
            .get(self.command_url("get"))
            .query(&[("key", key)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| StorageError::transport(err.without_url().to_string()))?;

        Self::parse_result(response).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let response = self
            .http_client
            .post(self.command_url("set"))
            .query(&[("key", key)])
            .bearer_auth(&self.token)
            .json(&SetBody { value })
            .send()
            .await
            .map_err(|err| StorageError::transport(err.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let response = self
            .http_client
            .post(self.command_url("del"))
            .query(&[("key", key)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| StorageError::transport(err.without_url().to_string()))?;

        let status = response.status();
        // A strict server may answer 404 for an absent key; deletion is
        // idempotent either way.
        if !status.is_success() && status.as_u16() != 404 {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_driver() -> RestDriver {
        let http = HttpConfig {
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(400),
        };
        // Nothing listens on the discard port, so every call fails at
        // the transport layer.
        RestDriver::new(&RestConfig::new("http://127.0.0.1:9", "token"), &http).unwrap()
    }

    #[test]
    fn test_command_url_trims_trailing_slash() {
        let driver = RestDriver::new(
            &RestConfig::new("https://kv.example.com/", "token"),
            &HttpConfig::default(),
        )
        .unwrap();
        assert_eq!(driver.command_url("get"), "https://kv.example.com/get");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let driver = unreachable_driver();

        let err = driver.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)), "got {:?}", err);
        assert!(err.is_recoverable());

        let err = driver.set("k", "v").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)), "got {:?}", err);

        let err = driver.delete("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)), "got {:?}", err);
    }
}
