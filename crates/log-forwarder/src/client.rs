// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of batches to the New Relic Logs API.
//!
//! Each batch is one POST of its JSON body with the license key in the
//! `X-License-Key` header. A non-2xx answer is a delivery failure. Nothing
//! is retried: a failed batch is reported to the sink loop and dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::{debug, error};

use crate::batch::LogBatch;
use crate::config::ForwarderConfig;
use crate::errors::DeliveryError;
use crate::license_key::LicenseKeyFactory;
use crate::sink::LogSink;

pub const LICENSE_KEY_HEADER: &str = "X-License-Key";

#[derive(Debug, Clone)]
pub struct LogsApiClient {
    client: reqwest::Client,
    endpoint: String,
    license_key_factory: Arc<LicenseKeyFactory>,
}

impl LogsApiClient {
    pub fn new(
        license_key_factory: Arc<LicenseKeyFactory>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(LogsApiClient {
            client,
            endpoint: endpoint.into(),
            license_key_factory,
        })
    }

    pub fn from_config(
        license_key_factory: Arc<LicenseKeyFactory>,
        config: &ForwarderConfig,
    ) -> Result<Self, DeliveryError> {
        Self::new(
            license_key_factory,
            config.logs_endpoint(),
            config.delivery_timeout,
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn headers(&self) -> Result<HeaderMap, DeliveryError> {
        let Some(license_key) = self.license_key_factory.license_key().await else {
            return Err(DeliveryError::MissingLicenseKey);
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            LICENSE_KEY_HEADER,
            HeaderValue::from_str(license_key).map_err(|_| DeliveryError::MissingLicenseKey)?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl LogSink for LogsApiClient {
    async fn deliver(&self, batch: &LogBatch) -> Result<(), DeliveryError> {
        let headers = self.headers().await?;
        let body = serde_json::to_vec(batch)?;
        let size = body.len();

        let time = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = resp.status();
        if status.is_success() {
            debug!(
                "Delivered batch of {} entries ({size} bytes) in {} ms",
                batch.entry_count(),
                elapsed.as_millis()
            );
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        error!(
            "Logs API rejected batch after {} ms: {status} {body}",
            elapsed.as_millis()
        );
        Err(DeliveryError::Status { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::batch::LogEntry;
    use mockito::{Matcher, Server};

    fn batch() -> LogBatch {
        let mut attributes = Attributes::new();
        attributes.insert("logGroup", "/aws/lambda/test");
        LogBatch::new(
            Arc::new(attributes),
            vec![LogEntry {
                timestamp: Some("1700000000000".to_string()),
                log: "hello".to_string(),
            }],
        )
    }

    fn client(url: String, factory: LicenseKeyFactory) -> LogsApiClient {
        LogsApiClient::new(Arc::new(factory), url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_posts_json_with_license_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/log/v1")
            .match_header("X-License-Key", "mock-license-key")
            .match_header("Content-Type", "application/json")
            .match_body(Matcher::Json(serde_json::json!([{
                "common": {"attributes": {"logGroup": "/aws/lambda/test"}},
                "logs": [{"timestamp": "1700000000000", "message": "hello"}]
            }])))
            .with_status(202)
            .create_async()
            .await;

        let client = client(
            format!("{}/log/v1", server.url()),
            LicenseKeyFactory::from_key("mock-license-key"),
        );

        client.deliver(&batch()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_rejected_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/log/v1")
            .with_status(403)
            .with_body("invalid license key")
            .expect(1)
            .create_async()
            .await;

        let client = client(
            format!("{}/log/v1", server.url()),
            LicenseKeyFactory::from_key("bad-key"),
        );

        let err = client.deliver(&batch()).await.unwrap_err();
        match err {
            DeliveryError::Status { status, body } => {
                assert_eq!(status.as_u16(), 403);
                assert_eq!(body, "invalid license key");
            }
            other => panic!("unexpected error: {other}"),
        }
        // no retry
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_without_license_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/log/v1")
            .expect(0)
            .create_async()
            .await;

        let client = client(
            format!("{}/log/v1", server.url()),
            LicenseKeyFactory::from_resolver(Arc::new(|| Box::pin(async move { None::<String> }))),
        );

        let err = client.deliver(&batch()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::MissingLicenseKey));
        mock.assert_async().await;
    }

    #[test]
    fn test_from_config_uses_regional_endpoint() {
        let config = ForwarderConfig {
            region: "EU".to_string(),
            ..Default::default()
        };
        let client = LogsApiClient::from_config(
            Arc::new(LicenseKeyFactory::from_key("k")),
            &config,
        )
        .unwrap();

        assert_eq!(client.endpoint(), crate::constants::EU_LOGS_ENDPOINT);
    }
}
