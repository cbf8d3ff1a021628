// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log forwarder for cloud function log events.
//!
//! An invocation payload is classified as either inline CloudWatch Logs data
//! or a notification pointing at storage objects. Log lines are extracted
//! from it, oversized lines split, request ids carried across lines, and the
//! lines packed into size- and count-bounded batches. A single delivery task
//! posts each batch to the logs intake.
//!
//! - [`event`]: payload classification
//! - [`cloudwatch`], [`s3`]: line extraction per source
//! - [`splitter`], [`request_id`], [`attributes`], [`batch`]: line processing
//! - [`sink`], [`client`]: delivery
//! - [`handler`]: the invocation entry point tying it together

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod attributes;
pub mod batch;
pub mod client;
pub mod cloudtrail;
pub mod cloudwatch;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod event;
pub mod handler;
pub mod license_key;
pub mod logger;
pub mod object_store;
pub mod request_id;
pub mod s3;
pub mod sink;
pub mod splitter;
