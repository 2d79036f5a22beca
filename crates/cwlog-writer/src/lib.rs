// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered, batched delivery of line-oriented input to CloudWatch Logs.
//!
//! ```text
//!   write(bytes) ─> LineSplitter ─> EventBuffer
//!                                       │
//!          FlushScheduler (timer / signal)
//!                                       v
//!                    Flusher: drain one batch ─> RetryPolicy(DeliveryClient)
//!                                       │
//!                                       v
//!                               SequenceTracker
//! ```
//!
//! The entry point is [`writer::LogWriter`]. Delivery goes through a
//! [`client::DeliveryClient`]; [`http::LogsApiClient`] is the HTTP
//! implementation.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod flusher;
pub mod http;
pub mod retry;
pub mod scheduler;
pub mod sequence;
pub mod splitter;
pub mod writer;

pub use client::{DeliveryClient, Destination, Provisioner};
pub use config::{EmptyLinePolicy, WriterConfig};
pub use errors::{DeliveryError, WriterError};
pub use event::{Clock, LogEvent, SystemClock};
pub use writer::{LogWriter, LogWriterBuilder};
