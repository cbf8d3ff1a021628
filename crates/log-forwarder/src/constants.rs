// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and well-known names shared by the extraction pipeline.
//!
//! The size and count limits mirror the logs intake constraints: a payload
//! whose uncompressed entry text exceeds [`MAX_PAYLOAD_SIZE`] or which holds
//! more than [`MAX_PAYLOAD_MESSAGES`] entries is sealed and a new one started.

/// Maximum accumulated entry-text size of one batch, in bytes (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1_024 * 1_024;

/// Maximum number of entries in one batch.
pub const MAX_PAYLOAD_MESSAGES: usize = 1_000;

/// Lines longer than this are halved until every piece fits.
pub const MAX_MESSAGE_SIZE: usize = 1_024 * 1_024;

/// Upper bound on a single line read from a storage object. A longer line
/// stops line-by-line reading of that object.
pub const MAX_BUFFER_SIZE: usize = 10 * 1_024 * 1_024;

/// Capacity of the delivery channel between extraction and the sink loop.
pub const DEFAULT_BATCH_QUEUE_CAPACITY: usize = 1;

pub const INSTRUMENTATION_PROVIDER: &str = "aws";
pub const INSTRUMENTATION_NAME: &str = "newrelic-log-forwarder";
pub const INSTRUMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log groups owned by functions; only these get request id propagation.
pub const FUNCTION_LOG_GROUP_PREFIX: &str = "/aws/lambda/";

/// Matches the `RequestId: <uuid>` marker the function runtime writes on
/// START/END/REPORT lines.
pub const REQUEST_ID_PATTERN: &str =
    r"RequestId:\s([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})";

/// Audit trail log objects.
pub const AUDIT_LOG_KEY_PATTERN: &str = r"_CloudTrail_";

/// Audit trail digest objects. They only hold hashes of other log files.
pub const AUDIT_DIGEST_KEY_PATTERN: &str = r"_CloudTrail-Digest_";

pub const US_LOGS_ENDPOINT: &str = "https://log-api.newrelic.com/log/v1";
pub const EU_LOGS_ENDPOINT: &str = "https://log-api.eu.newrelic.com/log/v1";
