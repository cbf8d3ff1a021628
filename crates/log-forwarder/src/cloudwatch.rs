// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::attributes::{merge_custom_attributes, Attributes};
use crate::batch::BatchPacker;
use crate::context::ExecutionContext;
use crate::errors::ForwarderError;
use crate::event::CloudwatchLogsData;
use crate::request_id::RequestIdTracker;
use crate::sink::BatchSender;

/// Packs the log events of one CloudWatch subscription payload and hands
/// the sealed batches to `sender`, in order.
///
/// Request ids are tracked only for function log groups.
pub async fn forward_log_events(
    data: &CloudwatchLogsData,
    context: &ExecutionContext,
    custom_metadata: &str,
    sender: &mut BatchSender,
) -> Result<(), ForwarderError> {
    let mut attributes = Attributes::for_log_stream(&data.log_group, &data.log_stream, context);
    merge_custom_attributes(custom_metadata, &mut attributes);

    let mut packer = BatchPacker::new(attributes)
        .with_request_ids(RequestIdTracker::for_log_group(&data.log_group));
    pack_events(data, &mut packer, sender).await
}

async fn pack_events(
    data: &CloudwatchLogsData,
    packer: &mut BatchPacker,
    sender: &mut BatchSender,
) -> Result<(), ForwarderError> {
    for event in &data.log_events {
        let timestamp = event.timestamp.to_string();
        let sealed = packer.accept(&event.message, Some(&timestamp));
        sender.send_all(sealed).await?;
    }
    if let Some(batch) = packer.flush() {
        sender.send(batch).await?;
    }

    debug!(
        "Finished processing {} events of log group {}",
        data.log_events.len(),
        data.log_group
    );
    Ok(())
}
