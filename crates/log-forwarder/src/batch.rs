// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Greedy packing of log lines into size- and count-bounded batches.
//!
//! # Batching Strategy
//!
//! Lines are appended to the in-progress batch until one of two limits would
//! be crossed:
//! 1. **Size limit**: the accumulated entry text would exceed the payload size
//! 2. **Count limit**: the batch already holds the maximum number of entries
//!
//! When that happens the batch is sealed and a new one started. Lines longer
//! than the message size are split first (see [`crate::splitter`]), so a
//! single piece never exceeds the message size. Only one batch is in
//! progress at any time, which keeps memory bounded regardless of input size.
//!
//! # Output Format
//!
//! A sealed batch is a single-element list, ready to be posted as is:
//! ```json
//! [
//!   {
//!     "common": {"attributes": {"logGroup": "...", "aws.region": "..."}},
//!     "logs": [
//!       {"timestamp": "1700000000000", "message": "Log entry 1"},
//!       {"message": "Log entry 2"}
//!     ]
//!   }
//! ]
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::attributes::Attributes;
use crate::constants;
use crate::request_id::RequestIdTracker;
use crate::splitter::split_message_with_limit;

/// One post-split log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Source timestamp, when the source provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "message")]
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonData {
    pub attributes: Arc<Attributes>,
}

/// Entries sharing one attribute set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedLog {
    #[serde(rename = "common")]
    pub common_data: CommonData,
    #[serde(rename = "logs")]
    pub entries: Vec<LogEntry>,
}

/// The unit handed to the delivery sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogBatch(Vec<DetailedLog>);

impl LogBatch {
    #[must_use]
    pub fn new(attributes: Arc<Attributes>, entries: Vec<LogEntry>) -> Self {
        LogBatch(vec![DetailedLog {
            common_data: CommonData { attributes },
            entries,
        }])
    }

    #[must_use]
    pub fn detailed_logs(&self) -> &[DetailedLog] {
        &self.0
    }

    #[must_use]
    pub fn attributes(&self) -> Option<&Attributes> {
        self.0.first().map(|log| log.common_data.attributes.as_ref())
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.0.iter().flat_map(|log| log.entries.iter())
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.0.iter().map(|log| log.entries.len()).sum()
    }

    /// Accumulated entry text size, the quantity bounded by the size limit.
    #[must_use]
    pub fn text_size(&self) -> usize {
        self.entries().map(|entry| entry.log.len()).sum()
    }
}

/// Stateful accumulator for one logical source.
///
/// The packer owns the source's [`Attributes`]. Sealed batches hold a
/// snapshot of them: the attributes are shared until the next mutation,
/// which then copies them, so a sealed batch is never rewritten.
#[derive(Debug)]
pub struct BatchPacker {
    attributes: Arc<Attributes>,
    request_ids: Option<RequestIdTracker>,
    entries: Vec<LogEntry>,
    byte_size: usize,
    max_payload_size: usize,
    max_payload_messages: usize,
    max_message_size: usize,
    sealed: usize,
}

impl BatchPacker {
    /// Creates a packer with the intake limits from [`constants`].
    #[must_use]
    pub fn new(attributes: Attributes) -> Self {
        Self::with_limits(
            attributes,
            constants::MAX_PAYLOAD_SIZE,
            constants::MAX_PAYLOAD_MESSAGES,
            constants::MAX_MESSAGE_SIZE,
        )
    }

    #[must_use]
    pub fn with_limits(
        attributes: Attributes,
        max_payload_size: usize,
        max_payload_messages: usize,
        max_message_size: usize,
    ) -> Self {
        BatchPacker {
            attributes: Arc::new(attributes),
            request_ids: None,
            entries: Vec::new(),
            byte_size: 0,
            max_payload_size,
            max_payload_messages,
            max_message_size,
            sealed: 0,
        }
    }

    /// Stamps request ids found by `tracker` onto the attributes as lines
    /// are accepted.
    #[must_use]
    pub fn with_request_ids(mut self, tracker: Option<RequestIdTracker>) -> Self {
        self.request_ids = tracker;
        self
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Number of batches sealed so far.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.sealed
    }

    /// Accepts one raw line and returns the batches sealed while packing it,
    /// in order. Usually empty.
    pub fn accept(&mut self, line: &str, timestamp: Option<&str>) -> Vec<LogBatch> {
        let mut sealed = Vec::new();
        for piece in split_message_with_limit(line, self.max_message_size) {
            if self.would_overflow(piece.len()) {
                sealed.extend(self.seal());
            }
            if let Some(tracker) = self.request_ids.as_mut() {
                tracker.observe(piece, Arc::make_mut(&mut self.attributes));
            }
            self.entries.push(LogEntry {
                timestamp: timestamp.map(str::to_string),
                log: piece.to_string(),
            });
            self.byte_size += piece.len();
        }
        sealed
    }

    /// Seals whatever is in progress. Call once at end of input.
    pub fn flush(&mut self) -> Option<LogBatch> {
        self.seal()
    }

    fn would_overflow(&self, next_len: usize) -> bool {
        self.byte_size + next_len > self.max_payload_size
            || self.entries.len() >= self.max_payload_messages
    }

    fn seal(&mut self) -> Option<LogBatch> {
        if self.entries.is_empty() {
            return None;
        }
        let entries = std::mem::take(&mut self.entries);
        debug!(
            "Sealing batch of {} entries ({} bytes)",
            entries.len(),
            self.byte_size
        );
        self.byte_size = 0;
        self.sealed += 1;
        Some(LogBatch::new(Arc::clone(&self.attributes), entries))
    }
}
