// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Extraction of log lines from storage objects.
//!
//! For each referenced object:
//! 1. Digest objects are skipped.
//! 2. The object is opened; a failed or cancelled fetch aborts the invocation.
//! 3. A decoder is picked from the key suffix: `.gz` (gzip, a bad header is
//!    fatal), `.bz2` (bzip2) or none.
//! 4. Audit log objects are parsed as one JSON document, one line per record.
//!    Anything else is read line by line, each line capped at
//!    [`MAX_BUFFER_SIZE`].
//! 5. The packer is flushed at the end of the object.
//!
//! Objects are streamed. Decoding and line framing run on the blocking pool
//! and hand lines to the packer over a small bounded channel, so memory use
//! does not grow with object size.
//!
//! A read error in the middle of a line-by-line read stops reading the
//! object. Batches packed up to that point are still delivered and the
//! object is reported as truncated. Audit documents are all or nothing: any
//! decompression error is fatal.
//!
//! Lines are forwarded as text. Invalid UTF-8 sequences are replaced with
//! U+FFFD.

use std::io::{self, BufRead, BufReader, Read};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use tokio::sync::mpsc;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::attributes::{merge_custom_attributes, Attributes};
use crate::batch::BatchPacker;
use crate::cloudtrail::{is_audit_log_key, is_digest_key, parse_audit_records};
use crate::constants::MAX_BUFFER_SIZE;
use crate::context::ExecutionContext;
use crate::errors::ForwarderError;
use crate::event::ObjectRecord;
use crate::object_store::{ObjectStore, ObjectStream};
use crate::request_id::RequestIdTracker;
use crate::sink::BatchSender;

/// How reading an object ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    /// Audit-trail digest, not read
    Skipped,
    Complete,
    /// Reading stopped early on a read or decompression error
    Truncated,
}

const DECODE_BUFFER_SIZE: usize = 64 * 1024;
const LINE_QUEUE_CAPACITY: usize = 256;

/// Reads one object and hands its batches to `sender`.
pub async fn forward_object(
    store: &dyn ObjectStore,
    record: &ObjectRecord,
    context: &ExecutionContext,
    custom_metadata: &str,
    sender: &mut BatchSender,
    cancel: &CancellationToken,
) -> Result<ObjectOutcome, ForwarderError> {
    let ObjectRecord { bucket, key, .. } = record;
    if is_digest_key(key) {
        info!("Skipping audit digest object {key}");
        return Ok(ObjectOutcome::Skipped);
    }

    let mut attributes = Attributes::for_object(bucket, key, context);
    merge_custom_attributes(custom_metadata, &mut attributes);

    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ForwarderError::Cancelled),
        fetched = store.get_object(bucket, key) => fetched.map_err(|source| {
            error!("failed to get S3 object: {source}");
            ForwarderError::Fetch {
                bucket: bucket.clone(),
                key: key.clone(),
                source,
            }
        })?,
    };
    debug!("Opened object {key}");

    if is_audit_log_key(key) {
        forward_audit_log(stream, key, attributes, sender).await
    } else {
        let packer = BatchPacker::new(attributes).with_request_ids(Some(RequestIdTracker::default()));
        forward_lines(stream, key, packer, sender).await
    }
}

/// Picks a decoder from the key suffix. Gzip headers are checked here so a
/// corrupt object fails before any line is read.
fn open_reader<R>(key: &str, input: R) -> io::Result<Box<dyn BufRead + Send>>
where
    R: Read + Send + 'static,
{
    if key.ends_with(".gz") {
        let mut reader = BufReader::with_capacity(DECODE_BUFFER_SIZE, MultiGzDecoder::new(input));
        reader.fill_buf()?;
        Ok(Box::new(reader))
    } else if key.ends_with(".bz2") {
        Ok(Box::new(BufReader::with_capacity(
            DECODE_BUFFER_SIZE,
            MultiBzDecoder::new(input),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(DECODE_BUFFER_SIZE, input)))
    }
}

fn decompression_error(key: &str, source: io::Error) -> ForwarderError {
    ForwarderError::Decompression {
        key: key.to_string(),
        source,
    }
}

async fn forward_audit_log(
    stream: ObjectStream,
    key: &str,
    attributes: Attributes,
    sender: &mut BatchSender,
) -> Result<ObjectOutcome, ForwarderError> {
    let input = SyncIoBridge::new(stream);
    let decode_key = key.to_string();
    let document = tokio::task::spawn_blocking(move || {
        let mut document = Vec::new();
        open_reader(&decode_key, input)?.read_to_end(&mut document)?;
        Ok::<_, io::Error>(document)
    })
    .await
    .map_err(|e| ForwarderError::ReadTask(e.to_string()))?
    .map_err(|source| {
        error!("failed to decompress audit log {key}: {source}");
        decompression_error(key, source)
    })?;

    let lines = parse_audit_records(&document).map_err(|source| {
        error!("failed to parse audit log {key}: {source}");
        ForwarderError::AuditLog {
            key: key.to_string(),
            source,
        }
    })?;
    debug!("Parsed {} audit records", lines.len());

    let mut packer = BatchPacker::new(attributes);
    for line in &lines {
        let sealed = packer.accept(line, None);
        sender.send_all(sealed).await?;
    }
    if let Some(batch) = packer.flush() {
        sender.send(batch).await?;
    }
    Ok(ObjectOutcome::Complete)
}

/// How the blocking line reader stopped.
#[derive(Debug)]
enum ReadEnd {
    /// End of input, or the receiving side went away
    Complete,
    Truncated(io::Error),
}

async fn forward_lines(
    stream: ObjectStream,
    key: &str,
    mut packer: BatchPacker,
    sender: &mut BatchSender,
) -> Result<ObjectOutcome, ForwarderError> {
    let (line_tx, mut line_rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
    let input = SyncIoBridge::new(stream);
    let decode_key = key.to_string();
    let reading = tokio::task::spawn_blocking(move || read_lines(&decode_key, input, &line_tx));

    debug!("Reading file line by line");
    let mut lines = 0usize;
    while let Some(line) = line_rx.recv().await {
        lines += 1;
        let sealed = packer.accept(&line, None);
        sender.send_all(sealed).await?;
    }

    let end = reading
        .await
        .map_err(|e| ForwarderError::ReadTask(e.to_string()))?
        .map_err(|source| {
            error!("failed to create decompression reader: {source}");
            decompression_error(key, source)
        })?;
    let outcome = match end {
        ReadEnd::Complete => ObjectOutcome::Complete,
        ReadEnd::Truncated(e) => {
            error!("failed to read line by line after {lines} lines: {e}");
            ObjectOutcome::Truncated
        }
    };

    if let Some(batch) = packer.flush() {
        sender.send(batch).await?;
    }
    debug!("Finished reading {lines} lines into {} batches", packer.sealed_count());
    Ok(outcome)
}

/// Decodes `input` and sends its lines to `lines`. Runs on the blocking pool.
/// Only a failure to open the decoder is returned as an error.
fn read_lines<R>(key: &str, input: R, lines: &mpsc::Sender<String>) -> io::Result<ReadEnd>
where
    R: Read + Send + 'static,
{
    let mut reader = open_reader(key, input)?;
    let mut buf = Vec::new();
    loop {
        match read_line(reader.as_mut(), &mut buf, MAX_BUFFER_SIZE) {
            Ok(true) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if lines.blocking_send(line).is_err() {
                    return Ok(ReadEnd::Complete);
                }
            }
            Ok(false) => return Ok(ReadEnd::Complete),
            Err(e) => return Ok(ReadEnd::Truncated(e)),
        }
    }
}

/// Reads the next line into `buf` without its line ending. Returns `false`
/// at end of input. A line longer than `max_len` is an error.
fn read_line(reader: &mut dyn BufRead, buf: &mut Vec<u8>, max_len: usize) -> io::Result<bool> {
    buf.clear();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader.take(limit).read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line longer than {max_len} bytes"),
        ));
    }
    Ok(true)
}
