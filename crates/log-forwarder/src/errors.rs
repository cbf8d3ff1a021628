// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the forwarder and its collaborators.

use reqwest::StatusCode;

/// Failure of a whole invocation. Only fail-closed conditions end up here;
/// classification misses and metadata problems are logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("failed to fetch object {key} from bucket {bucket}: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to decompress {key}: {source}")]
    Decompression {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed audit log in {key}: {source}")]
    AuditLog {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invocation cancelled")]
    Cancelled,

    #[error("delivery task failed: {0}")]
    SinkTask(String),

    #[error("object read task failed: {0}")]
    ReadTask(String),
}

/// Error returned by an [`crate::object_store::ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("object not found")]
    NotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

/// Error returned by a [`crate::sink::LogSink`]. The sink loop logs these;
/// nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no license key available")]
    MissingLicenseKey,

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status}: logs intake rejected batch: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("invalid function ARN: {0}")]
    InvalidArn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("unknown region 'AP'".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: unknown region 'AP'");
    }

    #[test]
    fn test_fetch_error_is_wrapped_with_location() {
        let error = ForwarderError::Fetch {
            bucket: "logs".to_string(),
            key: "a/b.gz".to_string(),
            source: FetchError::Backend("s3 error".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "failed to fetch object a/b.gz from bucket logs: s3 error"
        );
    }
}
