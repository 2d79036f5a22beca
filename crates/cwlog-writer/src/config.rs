// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::BatchLimits;
use crate::constants::{
    BACKOFF_UNIT, EVENT_OVERHEAD_BYTES, FLUSH_INTERVAL, MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES,
    MAX_RETRIES,
};
use crate::errors::WriterError;
use std::env;
use std::time::Duration;

/// What to do with a line that has no content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EmptyLinePolicy {
    /// Drop the line; no event is produced.
    #[default]
    Skip,
    /// Produce an event carrying this text instead.
    Placeholder(String),
}

/// Configuration for a [`LogWriter`](crate::writer::LogWriter)
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Log group the stream belongs to
    pub log_group: String,
    /// Log stream receiving the events
    pub log_stream: String,
    /// Period of the background flush
    pub flush_interval: Duration,
    /// Byte cap of one batch, per-event overhead included
    pub max_batch_bytes: usize,
    /// Event cap of one batch
    pub max_batch_events: usize,
    /// Attempts per batch before the failure becomes terminal
    pub max_retries: u32,
    /// Linear backoff unit between attempts
    pub backoff_unit: Duration,
    pub empty_lines: EmptyLinePolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            log_group: String::new(),
            log_stream: String::new(),
            flush_interval: FLUSH_INTERVAL,
            max_batch_bytes: MAX_BATCH_SIZE_BYTES,
            max_batch_events: MAX_BATCH_EVENTS,
            max_retries: MAX_RETRIES,
            backoff_unit: BACKOFF_UNIT,
            empty_lines: EmptyLinePolicy::Skip,
        }
    }
}

impl WriterConfig {
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            log_stream: log_stream.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, WriterError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WriterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|val| val.trim().parse::<u64>().ok());
        let parse_usize = |key: &str| lookup(key).and_then(|val| val.trim().parse::<usize>().ok());

        let config = Self {
            log_group: lookup("CWLOG_LOG_GROUP").unwrap_or_default(),
            log_stream: lookup("CWLOG_LOG_STREAM").unwrap_or_default(),
            flush_interval: parse_u64("CWLOG_FLUSH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            max_batch_bytes: parse_usize("CWLOG_MAX_BATCH_BYTES")
                .unwrap_or(defaults.max_batch_bytes),
            max_batch_events: parse_usize("CWLOG_MAX_BATCH_EVENTS")
                .unwrap_or(defaults.max_batch_events),
            max_retries: lookup("CWLOG_MAX_RETRIES")
                .and_then(|val| val.trim().parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
            backoff_unit: parse_u64("CWLOG_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_unit),
            empty_lines: lookup("CWLOG_EMPTY_LINE_PLACEHOLDER")
                .filter(|val| !val.is_empty())
                .map(EmptyLinePolicy::Placeholder)
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), WriterError> {
        if self.log_group.trim().is_empty() {
            return Err(WriterError::InvalidConfig(
                "log group is required".to_string(),
            ));
        }

        if self.log_stream.trim().is_empty() {
            return Err(WriterError::InvalidConfig(
                "log stream is required".to_string(),
            ));
        }

        if self.max_batch_bytes <= EVENT_OVERHEAD_BYTES {
            return Err(WriterError::InvalidConfig(format!(
                "max batch bytes must be greater than the {EVENT_OVERHEAD_BYTES} byte event overhead"
            )));
        }

        if self.max_batch_events == 0 {
            return Err(WriterError::InvalidConfig(
                "max batch events must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(WriterError::InvalidConfig(
                "max retries must be greater than 0".to_string(),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(WriterError::InvalidConfig(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        if let EmptyLinePolicy::Placeholder(placeholder) = &self.empty_lines {
            if placeholder.is_empty() || placeholder.len() + EVENT_OVERHEAD_BYTES > self.max_batch_bytes
            {
                return Err(WriterError::InvalidConfig(
                    "empty line placeholder must be non-empty and fit in a batch".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_bytes: self.max_batch_bytes,
            max_events: self.max_batch_events,
        }
    }
}
