// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::EVENT_OVERHEAD_BYTES;

/// One line of input, stamped when it was appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }

    /// Bytes this event counts for against a batch limit.
    pub fn size(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD_BYTES
    }
}

/// Source of event timestamps.
pub trait Clock: Debug + Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}
