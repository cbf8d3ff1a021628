// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request id discovery and propagation across a line sequence.
//!
//! Function runtimes only print the request id on some lines (START, END,
//! REPORT, or JSON lines with a `requestId` field). Once an id has been seen,
//! it is carried forward onto every following line of the same stream until
//! another id shows up. Streams that interleave several requests get the most
//! recent id, which is a known approximation.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::attributes::{Attributes, REQUEST_ID};
use crate::constants::{FUNCTION_LOG_GROUP_PREFIX, REQUEST_ID_PATTERN};

lazy_static! {
    /// `RequestId: <uuid>` as printed on START, END and REPORT lines.
    static ref REQUEST_ID_REGEX: Regex = request_id_regex();
}

#[allow(clippy::expect_used)]
fn request_id_regex() -> Regex {
    Regex::new(REQUEST_ID_PATTERN).expect("failed creating regex")
}

/// Carries the last seen request id through one extraction call.
///
/// Lines must be observed once each, in emission order.
#[derive(Debug, Clone)]
pub struct RequestIdTracker {
    pattern: Regex,
    last_id: Option<String>,
}

impl Default for RequestIdTracker {
    fn default() -> Self {
        Self::new(REQUEST_ID_REGEX.clone())
    }
}

impl RequestIdTracker {
    #[must_use]
    pub fn new(pattern: Regex) -> Self {
        RequestIdTracker {
            pattern,
            last_id: None,
        }
    }

    /// Tracker for an inline log stream. Only function log groups carry
    /// request ids; other groups get `None`.
    #[must_use]
    pub fn for_log_group(log_group: &str) -> Option<Self> {
        log_group
            .starts_with(FUNCTION_LOG_GROUP_PREFIX)
            .then(Self::default)
    }

    #[must_use]
    pub fn last_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Looks for a request id in `line` and stamps the current id onto
    /// `attributes`. Returns the id now in effect.
    pub fn observe(&mut self, line: &str, attributes: &mut Attributes) -> Option<&str> {
        if let Some(found) = self.find_request_id(line) {
            self.last_id = Some(found);
        }
        if let Some(id) = self.last_id.as_deref() {
            attributes.set_request_id(id);
        }
        self.last_id.as_deref()
    }

    fn find_request_id(&self, line: &str) -> Option<String> {
        match parse_json_object(line) {
            Some(object) => json_request_id(&object),
            None => self
                .pattern
                .captures(line)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}

fn parse_json_object(line: &str) -> Option<serde_json::Map<String, Value>> {
    if !line.trim_start().starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// `requestId` at the top level, or one level down under `record` as in the
/// platform events of the structured log format.
fn json_request_id(object: &serde_json::Map<String, Value>) -> Option<String> {
    let top_level = object.get(REQUEST_ID).and_then(Value::as_str);
    let nested = || {
        object
            .get("record")
            .and_then(|record| record.get(REQUEST_ID))
            .and_then(Value::as_str)
    };
    top_level
        .or_else(nested)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
