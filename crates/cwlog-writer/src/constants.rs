// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and defaults of the CloudWatch Logs `PutLogEvents` API.
//!
//! The batch size is calculated by counting the UTF-8 bytes of each message
//! plus a fixed per-event overhead.
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatchLogs/latest/APIReference/API_PutLogEvents.html>

use std::time::Duration;

/// Maximum number of bytes in a single batch, per-event overhead included.
pub const MAX_BATCH_SIZE_BYTES: usize = 1_048_576;

/// Maximum number of events in a single batch.
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// Static size of each event excluding the message text.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Number of attempts made for one batch before the failure becomes terminal.
pub const MAX_RETRIES: u32 = 5;

/// Linear backoff unit: attempt `n` waits `n * BACKOFF_UNIT` before retrying.
pub const BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// Period of the background flush.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);
