// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudTrail audit log objects.
//!
//! An audit log object is one JSON document `{"Records": [...]}`. Every
//! record becomes a single log line, with its RFC 3339 `eventTime` copied
//! into a `timestamp` field as epoch milliseconds. Digest objects only carry
//! integrity hashes and are never read.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{AUDIT_DIGEST_KEY_PATTERN, AUDIT_LOG_KEY_PATTERN};

type AuditRecord = Map<String, Value>;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuditLog {
    #[serde(default)]
    records: Vec<AuditRecord>,
}

#[must_use]
pub fn is_digest_key(key: &str) -> bool {
    key.contains(AUDIT_DIGEST_KEY_PATTERN)
}

#[must_use]
pub fn is_audit_log_key(key: &str) -> bool {
    key.contains(AUDIT_LOG_KEY_PATTERN) && !is_digest_key(key)
}

/// Parses an audit log document into one JSON line per record.
///
/// A malformed document is an error. A record that cannot be written back
/// out is dropped.
pub fn parse_audit_records(content: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let log: AuditLog = serde_json::from_slice(content)?;
    let mut lines = Vec::with_capacity(log.records.len());

    for mut record in log.records {
        add_timestamp(&mut record);
        match serde_json::to_string(&record) {
            Ok(line) => lines.push(line),
            Err(e) => warn!("Dropping audit record that failed to serialize: {e}"),
        }
    }

    Ok(lines)
}

fn add_timestamp(record: &mut AuditRecord) {
    let Some(Value::String(event_time)) = record.get("eventTime") else {
        return;
    };
    match DateTime::parse_from_rfc3339(event_time) {
        Ok(time) => {
            let millis = time.timestamp_millis();
            record.insert("timestamp".to_string(), Value::from(millis));
        }
        Err(e) => debug!("Keeping audit record without timestamp, bad eventTime {event_time}: {e}"),
    }
}
