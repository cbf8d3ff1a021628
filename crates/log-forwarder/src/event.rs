// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Classification of inbound invocation payloads.
//!
//! A payload is tried against each known envelope in a fixed order:
//! 1. CloudWatch Logs subscription (`{"awslogs": {"data": base64(gzip(json))}}`)
//! 2. S3 event notification (first record has a non-empty `eventName`)
//! 3. SNS notification whose messages are S3 event notifications
//!
//! The first match wins. A payload matching none of them is not an error;
//! the caller is expected to skip it.

use std::fmt;
use std::io::Read;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use flate2::read::MultiGzDecoder;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::{debug, warn};

/// Decoded CloudWatch Logs subscription payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudwatchLogsData {
    #[serde(default)]
    pub owner: String,
    pub log_group: String,
    pub log_stream: String,
    #[serde(default)]
    pub subscription_filters: Vec<String>,
    #[serde(default)]
    pub message_type: String,
    pub log_events: Vec<CloudwatchLogEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudwatchLogEvent {
    #[serde(default)]
    pub id: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub message: String,
}

/// A storage object referenced by a notification, with its key already
/// URL-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub event_name: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    DirectLog(CloudwatchLogsData),
    ObjectPointer(Vec<ObjectRecord>),
}

impl ClassifiedEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClassifiedEvent::DirectLog(_) => EventKind::DirectLog,
            ClassifiedEvent::ObjectPointer(_) => EventKind::ObjectPointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DirectLog,
    ObjectPointer,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::DirectLog => write!(f, "cloudwatch"),
            EventKind::ObjectPointer => write!(f, "s3"),
        }
    }
}

#[derive(Deserialize)]
struct CloudwatchLogsEvent {
    awslogs: CloudwatchLogsRaw,
}

#[derive(Deserialize)]
struct CloudwatchLogsRaw {
    data: String,
}

// https://docs.aws.amazon.com/AmazonS3/latest/userguide/notification-content-structure.html
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct S3Event {
    #[serde(default)]
    records: Vec<S3EventRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3EventRecord {
    #[serde(default)]
    event_name: String,
    s3: Option<S3Entity>,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SnsEvent {
    records: Vec<SnsEventRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SnsEventRecord {
    sns: SnsEntity,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SnsEntity {
    message: String,
}

/// Classifies `payload`, returning `None` when it matches no known envelope.
#[must_use]
pub fn classify(payload: &[u8]) -> Option<ClassifiedEvent> {
    if let Some(data) = parse_cloudwatch(payload) {
        return Some(ClassifiedEvent::DirectLog(data));
    }
    if let Some(records) = parse_s3(payload) {
        return Some(ClassifiedEvent::ObjectPointer(records));
    }
    parse_sns(payload).map(ClassifiedEvent::ObjectPointer)
}

fn parse_cloudwatch(payload: &[u8]) -> Option<CloudwatchLogsData> {
    let event: CloudwatchLogsEvent = serde_json::from_slice(payload).ok()?;
    match decode_cloudwatch_data(&event.awslogs.data) {
        Ok(data) => Some(data),
        Err(e) => {
            debug!("Payload has an awslogs field but does not decode: {e}");
            None
        }
    }
}

fn decode_cloudwatch_data(data: &str) -> Result<CloudwatchLogsData, Box<dyn std::error::Error>> {
    let compressed = BASE64_STANDARD.decode(data.as_bytes())?;
    let mut decoded = Vec::new();
    MultiGzDecoder::new(&compressed[..]).read_to_end(&mut decoded)?;
    Ok(serde_json::from_slice(&decoded)?)
}

fn parse_s3(payload: &[u8]) -> Option<Vec<ObjectRecord>> {
    let event: S3Event = serde_json::from_slice(payload).ok()?;
    let first = event.records.first()?;
    if first.event_name.is_empty() {
        return None;
    }
    Some(object_records(event))
}

fn parse_sns(payload: &[u8]) -> Option<Vec<ObjectRecord>> {
    let event: SnsEvent = serde_json::from_slice(payload).ok()?;
    if event.records.is_empty() {
        return None;
    }
    let mut records = Vec::new();
    for record in event.records {
        match serde_json::from_str::<S3Event>(&record.sns.message) {
            Ok(inner) => records.extend(object_records(inner)),
            Err(e) => warn!("Skipping notification message that is not an S3 event: {e}"),
        }
    }
    Some(records)
}

fn object_records(event: S3Event) -> Vec<ObjectRecord> {
    event
        .records
        .into_iter()
        .filter_map(|record| match record.s3 {
            Some(entity) => Some(ObjectRecord {
                event_name: record.event_name,
                bucket: entity.bucket.name,
                key: url_decode_key(&entity.object.key),
            }),
            None => {
                warn!("Skipping S3 event record {} without an object", record.event_name);
                None
            }
        })
        .collect()
}

/// Decodes a form-encoded object key (`+` for space, `%XX` escapes).
#[must_use]
pub fn url_decode_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    pub(crate) fn cloudwatch_payload(log_group: &str, messages: &[&str]) -> Vec<u8> {
        let events: Vec<_> = messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                json!({"id": i.to_string(), "timestamp": 1_700_000_000_000_i64 + i as i64, "message": message})
            })
            .collect();
        let data = json!({
            "messageType": "DATA_MESSAGE",
            "owner": "123456789012",
            "logGroup": log_group,
            "logStream": "2024/12/03/[$LATEST]abcdef",
            "subscriptionFilters": ["nr-forwarder"],
            "logEvents": events,
        });
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data.to_string().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        json!({"awslogs": {"data": BASE64_STANDARD.encode(compressed)}})
            .to_string()
            .into_bytes()
    }

    pub(crate) fn s3_payload(objects: &[(&str, &str)]) -> Vec<u8> {
        json!({"Records": s3_records(objects)}).to_string().into_bytes()
    }

    fn s3_records(objects: &[(&str, &str)]) -> Vec<serde_json::Value> {
        objects
            .iter()
            .map(|(bucket, key)| {
                json!({
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "awsRegion": "us-east-1",
                    "eventName": "ObjectCreated:Put",
                    "s3": {"bucket": {"name": bucket}, "object": {"key": key, "size": 10}}
                })
            })
            .collect()
    }

    #[test]
    fn test_classify_cloudwatch() {
        let payload = cloudwatch_payload("/aws/lambda/test", &["hello", "world"]);

        let Some(ClassifiedEvent::DirectLog(data)) = classify(&payload) else {
            panic!("expected a direct log event");
        };
        assert_eq!(data.log_group, "/aws/lambda/test");
        assert_eq!(data.log_events.len(), 2);
        assert_eq!(data.log_events[1].timestamp, 1_700_000_000_001);
        assert_eq!(data.log_events[1].message, "world");
    }

    #[test]
    fn test_classify_s3() {
        let payload = s3_payload(&[("logs", "a/b.log"), ("logs", "c/d.gz")]);

        let event = classify(&payload).unwrap();

        assert_eq!(event.kind(), EventKind::ObjectPointer);
        let ClassifiedEvent::ObjectPointer(records) = event else {
            unreachable!()
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bucket, "logs");
        assert_eq!(records[1].key, "c/d.gz");
    }

    #[test]
    fn test_s3_key_is_url_decoded() {
        let payload = s3_payload(&[("logs", "my+folder/caf%C3%A9%3Dlog.gz")]);

        let Some(ClassifiedEvent::ObjectPointer(records)) = classify(&payload) else {
            panic!("expected an object pointer event");
        };
        assert_eq!(records[0].key, "my folder/café=log.gz");
    }

    #[test]
    fn test_s3_without_event_name_is_not_classified() {
        let payload = json!({"Records": [{"s3": {"bucket": {"name": "b"}, "object": {"key": "k"}}}]})
            .to_string();

        assert!(classify(payload.as_bytes()).is_none());
    }

    #[test]
    fn test_empty_records_is_not_classified() {
        assert!(classify(br#"{"Records": []}"#).is_none());
    }

    #[test]
    fn test_classify_sns_wrapped_s3() {
        let inner = json!({"Records": s3_records(&[("logs", "x/y.bz2")])}).to_string();
        let payload = json!({
            "Records": [
                {"EventSource": "aws:sns", "Sns": {"Message": inner}},
                {"EventSource": "aws:sns", "Sns": {"Message": "not json"}}
            ]
        })
        .to_string();

        let Some(ClassifiedEvent::ObjectPointer(records)) = classify(payload.as_bytes()) else {
            panic!("expected an object pointer event");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "x/y.bz2");
    }

    #[test]
    fn test_unknown_payloads() {
        for payload in [
            &b"not json"[..],
            br#"{}"#,
            br#"{"awslogs": {"data": "not base64!"}}"#,
            br#"{"awslogs": {"data": "aGVsbG8="}}"#,
            br#"{"detail-type": "Scheduled Event"}"#,
        ] {
            assert!(classify(payload).is_none());
        }
    }

    #[test]
    fn test_cloudwatch_takes_precedence() {
        // a payload shaped like both envelopes resolves to the inline logs
        let cloudwatch: serde_json::Value =
            serde_json::from_slice(&cloudwatch_payload("/aws/lambda/test", &["x"])).unwrap();
        let mut payload: serde_json::Value = serde_json::from_slice(&s3_payload(&[("b", "k")])).unwrap();
        payload["awslogs"] = cloudwatch["awslogs"].clone();

        let event = classify(payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.kind(), EventKind::DirectLog);
    }
}
