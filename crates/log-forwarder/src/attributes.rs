// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common attributes attached to every entry of a batch.
//!
//! The backend derives the originating entity from these attributes, so the
//! identifying keys (see [`RESERVED_KEYS`]) are never overwritten by
//! user-supplied metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::constants;
use crate::context::ExecutionContext;

pub const ACCOUNT_ID: &str = "aws.accountId";
pub const REALM: &str = "aws.realm";
pub const REGION: &str = "aws.region";
pub const LOG_GROUP: &str = "logGroup";
pub const LOG_STREAM: &str = "logStream";
pub const LOG_BUCKET_NAME: &str = "logBucketName";
pub const LOG_OBJECT_URI: &str = "logObjectURI";
pub const INSTRUMENTATION_PROVIDER: &str = "instrumentation.provider";
pub const INSTRUMENTATION_NAME: &str = "instrumentation.name";
pub const INSTRUMENTATION_VERSION: &str = "instrumentation.version";
pub const REQUEST_ID: &str = "requestId";

/// Keys custom metadata can never set.
pub const RESERVED_KEYS: [&str; 11] = [
    ACCOUNT_ID,
    REALM,
    REGION,
    LOG_GROUP,
    LOG_STREAM,
    LOG_BUCKET_NAME,
    LOG_OBJECT_URI,
    INSTRUMENTATION_PROVIDER,
    INSTRUMENTATION_NAME,
    INSTRUMENTATION_VERSION,
    REQUEST_ID,
];

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value.into())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Attribute set of one logical source (a log stream or a storage object).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes of a log stream delivered inline.
    #[must_use]
    pub fn for_log_stream(log_group: &str, log_stream: &str, context: &ExecutionContext) -> Self {
        let mut attributes = Self::with_context(context);
        attributes.insert(LOG_GROUP, log_group);
        attributes.insert(LOG_STREAM, log_stream);
        attributes
    }

    /// Attributes of a storage object.
    #[must_use]
    pub fn for_object(bucket: &str, key: &str, context: &ExecutionContext) -> Self {
        let mut attributes = Self::with_context(context);
        attributes.insert(LOG_BUCKET_NAME, bucket);
        attributes.insert(LOG_OBJECT_URI, key);
        attributes
    }

    fn with_context(context: &ExecutionContext) -> Self {
        let mut attributes = Self::new();
        attributes.insert(ACCOUNT_ID, context.account_id.as_str());
        attributes.insert(REALM, context.realm.as_str());
        attributes.insert(REGION, context.region.as_str());
        attributes.insert(INSTRUMENTATION_PROVIDER, constants::INSTRUMENTATION_PROVIDER);
        attributes.insert(INSTRUMENTATION_NAME, constants::INSTRUMENTATION_NAME);
        attributes.insert(INSTRUMENTATION_VERSION, constants::INSTRUMENTATION_VERSION);
        attributes
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID).and_then(AttributeValue::as_str)
    }

    pub fn set_request_id(&mut self, request_id: &str) {
        self.insert(REQUEST_ID, request_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

#[derive(Debug, Deserialize)]
struct CustomAttribute {
    #[serde(rename = "AttributeName")]
    name: String,
    #[serde(rename = "AttributeValue")]
    value: AttributeValue,
}

/// Merges user-supplied metadata (`[{"AttributeName": .., "AttributeValue": ..}]`)
/// into `attributes` and returns how many attributes were added.
///
/// Enrichment is best effort: malformed JSON is logged and ignored. A name
/// that is reserved or already present is skipped.
pub fn merge_custom_attributes(json_config: &str, attributes: &mut Attributes) -> usize {
    if json_config.trim().is_empty() {
        return 0;
    }

    let custom_attributes: Vec<CustomAttribute> = match serde_json::from_str(json_config) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("failed to unmarshal custom metadata: {e}");
            return 0;
        }
    };

    let mut added = 0;
    for CustomAttribute { name, value } in custom_attributes {
        if RESERVED_KEYS.contains(&name.as_str()) || attributes.contains_key(&name) {
            debug!("skipping custom attribute {name}: key is reserved or already set");
            continue;
        }
        attributes.insert(name, value);
        added += 1;
    }
    added
}
