// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Invocation entry point.
//!
//! One invocation runs two tasks: extraction on the caller's task and the
//! delivery loop on a spawned one. The delivery loop is started before
//! extraction, the channel is closed once extraction returns (successfully
//! or not), and the loop is joined before the invocation ends. No batch is
//! dropped and no task outlives the invocation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cloudwatch::forward_log_events;
use crate::config::ForwarderConfig;
use crate::context::ExecutionContext;
use crate::errors::ForwarderError;
use crate::event::{classify, ClassifiedEvent, EventKind, ObjectRecord};
use crate::object_store::ObjectStore;
use crate::s3::{forward_object, ObjectOutcome};
use crate::sink::{BatchSender, DeliveryReport, LogSink, SinkService};

/// What one invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationSummary {
    /// `None` when the payload matched no known event shape
    pub kind: Option<EventKind>,
    pub batches_produced: usize,
    pub batches_delivered: usize,
    pub delivery_failures: usize,
    /// Objects whose reading stopped early; their leading lines were delivered
    pub truncated_objects: usize,
}

pub struct Forwarder {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn LogSink>,
    context: ExecutionContext,
    custom_metadata: String,
    queue_capacity: usize,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn LogSink>,
        context: ExecutionContext,
    ) -> Self {
        Forwarder {
            store,
            sink,
            context,
            custom_metadata: String::new(),
            queue_capacity: crate::constants::DEFAULT_BATCH_QUEUE_CAPACITY,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &ForwarderConfig,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn LogSink>,
        context: ExecutionContext,
    ) -> Self {
        Self::new(store, sink, context)
            .with_custom_metadata(config.custom_metadata.clone())
            .with_queue_capacity(config.batch_queue_capacity)
    }

    #[must_use]
    pub fn with_custom_metadata(mut self, custom_metadata: impl Into<String>) -> Self {
        self.custom_metadata = custom_metadata.into();
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Handles one raw event payload.
    ///
    /// An unrecognised payload is logged and succeeds without producing
    /// anything. Fetch, decompression setup and audit log parse failures fail
    /// the invocation; batches produced before the failure are still
    /// delivered.
    pub async fn handle(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<InvocationSummary, ForwarderError> {
        let Some(event) = classify(payload) else {
            error!("unable to process unknown event type. Supported event types are cloudwatch and s3");
            return Ok(InvocationSummary::default());
        };
        let kind = event.kind();
        let span = info_span!("invocation", kind = %kind);

        self.handle_classified(event, cancel).instrument(span).await
    }

    async fn handle_classified(
        &self,
        event: ClassifiedEvent,
        cancel: &CancellationToken,
    ) -> Result<InvocationSummary, ForwarderError> {
        let mut summary = InvocationSummary {
            kind: Some(event.kind()),
            ..Default::default()
        };

        let (service, mut sender) = SinkService::new(Arc::clone(&self.sink), self.queue_capacity);
        let consumer = tokio::spawn(service.run().in_current_span());

        let extracted = match &event {
            ClassifiedEvent::DirectLog(data) => {
                debug!("processing cloudwatch event for log group {}", data.log_group);
                forward_log_events(data, &self.context, &self.custom_metadata, &mut sender).await
            }
            ClassifiedEvent::ObjectPointer(records) => {
                debug!("processing s3 event with {} records", records.len());
                self.forward_objects(records, &mut sender, cancel, &mut summary)
                    .await
            }
        };
        summary.batches_produced = sender.sent();

        // closing the channel lets the consumer drain and exit
        drop(sender);
        let report = join_consumer(consumer).await;

        let report = match (extracted, report) {
            (Err(e), _) => {
                error!("error processing event: {e}");
                return Err(e);
            }
            (Ok(()), Err(e)) => return Err(e),
            (Ok(()), Ok(report)) => report,
        };
        summary.batches_delivered = report.delivered;
        summary.delivery_failures = report.failed;

        info!(
            "Forwarded {} batches ({} failed, {} objects truncated)",
            summary.batches_produced, summary.delivery_failures, summary.truncated_objects
        );
        Ok(summary)
    }

    async fn forward_objects(
        &self,
        records: &[ObjectRecord],
        sender: &mut BatchSender,
        cancel: &CancellationToken,
        summary: &mut InvocationSummary,
    ) -> Result<(), ForwarderError> {
        for record in records {
            let span = info_span!("object", bucket = %record.bucket, key = %record.key);
            let outcome = forward_object(
                self.store.as_ref(),
                record,
                &self.context,
                &self.custom_metadata,
                sender,
                cancel,
            )
            .instrument(span)
            .await?;
            if outcome == ObjectOutcome::Truncated {
                summary.truncated_objects += 1;
            }
        }
        Ok(())
    }
}

async fn join_consumer(
    consumer: tokio::task::JoinHandle<DeliveryReport>,
) -> Result<DeliveryReport, ForwarderError> {
    consumer.await.map_err(|e| {
        warn!("delivery task did not finish: {e}");
        ForwarderError::SinkTask(e.to_string())
    })
}
