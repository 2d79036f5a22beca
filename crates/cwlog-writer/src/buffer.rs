// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered buffer of pending log events and batch selection.
//!
//! Events are appended at the tail as lines are produced and drained from the
//! head one batch at a time. A batch is the longest prefix of the buffer that
//! stays within both the byte limit and the event-count limit; the event that
//! would cross either limit stays at the head for the next batch.
//!
//! Batch size is `sum(len(message) + 26)`, matching how the service accounts for
//! events. The running total of buffered bytes is kept alongside the queue.

use std::collections::VecDeque;
use tracing::warn;

use crate::config::EmptyLinePolicy;
use crate::constants::{EVENT_OVERHEAD_BYTES, MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES};
use crate::event::LogEvent;

/// Byte and count caps for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_bytes: usize,
    pub max_events: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_BATCH_SIZE_BYTES,
            max_events: MAX_BATCH_EVENTS,
        }
    }
}

impl BatchLimits {
    /// Longest message that still fits in a batch on its own.
    fn max_message_bytes(&self) -> usize {
        self.max_bytes.saturating_sub(EVENT_OVERHEAD_BYTES)
    }
}

#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<LogEvent>,
    size: usize,
    /// Newest timestamp handed out so far; survives drains.
    last_timestamp: i64,
    limits: BatchLimits,
    empty_lines: EmptyLinePolicy,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(BatchLimits::default(), EmptyLinePolicy::default())
    }
}

impl EventBuffer {
    pub fn new(limits: BatchLimits, empty_lines: EmptyLinePolicy) -> Self {
        Self {
            events: VecDeque::new(),
            size: 0,
            last_timestamp: i64::MIN,
            limits,
            empty_lines,
        }
    }

    /// Appends one line stamped with `timestamp`.
    ///
    /// Returns `false` if the line was dropped by the empty-line policy.
    /// Timestamps never go backwards relative to any earlier event, drained or
    /// not. A message too large to ever fit in a batch is truncated.
    pub fn append(&mut self, line: String, timestamp: i64) -> bool {
        let mut message = if line.is_empty() {
            match &self.empty_lines {
                EmptyLinePolicy::Skip => return false,
                EmptyLinePolicy::Placeholder(placeholder) => placeholder.clone(),
            }
        } else {
            line
        };

        let max_message = self.limits.max_message_bytes();
        if message.len() > max_message {
            warn!(
                "CWLOG | Line of {} bytes exceeds the batch limit, truncating to {} bytes",
                message.len(),
                max_message
            );
            truncate_at_char_boundary(&mut message, max_message);
        }

        let timestamp = timestamp.max(self.last_timestamp);
        self.last_timestamp = timestamp;

        let event = LogEvent { message, timestamp };
        self.size += event.size();
        self.events.push_back(event);
        true
    }

    /// Removes and returns the next batch, oldest event first.
    ///
    /// The batch never exceeds either limit. Returns an empty vector when the
    /// buffer is empty.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        let mut size = 0;
        let mut count = 0;

        for event in &self.events {
            if count >= self.limits.max_events || size + event.size() > self.limits.max_bytes {
                break;
            }
            size += event.size();
            count += 1;
        }

        self.size -= size;
        self.events.drain(..count).collect()
    }

    /// True once at least one full batch is waiting.
    pub fn has_full_batch(&self) -> bool {
        self.events.len() >= self.limits.max_events || self.size >= self.limits.max_bytes
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total bytes buffered, per-event overhead included.
    pub fn size(&self) -> usize {
        self.size
    }
}

fn truncate_at_char_boundary(message: &mut String, max: usize) {
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
}
