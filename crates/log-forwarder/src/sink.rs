// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Handoff of sealed batches from extraction to delivery.
//!
//! ```text
//!    ┌──────────────┐
//!    │  Extractor   │ (single producer)
//!    └──────┬───────┘
//!           │ bounded channel
//!           v
//!    ┌──────────────┐
//!    │ Sink Service │ (single consumer task)
//!    └──────┬───────┘
//!           │ one call per batch
//!           v
//!    ┌──────────────┐
//!    │   LogSink    │ (delivery collaborator)
//!    └──────────────┘
//! ```
//!
//! The channel is bounded, so a producer waits while the consumer is busy
//! instead of piling batches up in memory. Dropping the [`BatchSender`]
//! closes the channel; the service drains what is left and returns a
//! [`DeliveryReport`]. Awaiting the service task is the completion barrier.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::batch::LogBatch;
use crate::errors::{DeliveryError, ForwarderError};

/// The delivery collaborator. Failures are logged by the service and never
/// retried.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn deliver(&self, batch: &LogBatch) -> Result<(), DeliveryError>;
}

/// Producer side of the delivery channel.
#[derive(Debug)]
pub struct BatchSender {
    tx: mpsc::Sender<LogBatch>,
    sent: usize,
}

impl BatchSender {
    /// Hands `batch` to the consumer, waiting while the channel is full.
    pub async fn send(&mut self, batch: LogBatch) -> Result<(), ForwarderError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| ForwarderError::SinkTask("delivery channel closed".to_string()))?;
        self.sent += 1;
        Ok(())
    }

    pub async fn send_all(&mut self, batches: Vec<LogBatch>) -> Result<(), ForwarderError> {
        for batch in batches {
            self.send(batch).await?;
        }
        Ok(())
    }

    /// Number of batches handed over so far.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.sent
    }
}

/// Outcome of draining the delivery channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Consumer side of the delivery channel.
pub struct SinkService {
    rx: mpsc::Receiver<LogBatch>,
    sink: Arc<dyn LogSink>,
}

impl SinkService {
    /// Creates the channel with room for `capacity` batches (at least one).
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, capacity: usize) -> (Self, BatchSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (SinkService { rx, sink }, BatchSender { tx, sent: 0 })
    }

    /// Forwards every batch in arrival order until all senders are dropped
    /// and the channel is drained.
    pub async fn run(mut self) -> DeliveryReport {
        debug!("Delivery loop started");
        let mut report = DeliveryReport::default();

        while let Some(batch) = self.rx.recv().await {
            match self.sink.deliver(&batch).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!("Failed to deliver batch of {} entries: {e}", batch.entry_count());
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Delivery loop finished: {} delivered, {} failed",
            report.delivered, report.failed
        );
        report
    }
}
