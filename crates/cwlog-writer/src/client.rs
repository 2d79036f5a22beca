// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collaborators the writer delivers through.
//!
//! [`DeliveryClient`] performs the append call; [`Provisioner`] is consulted
//! only when the destination turns out to be missing. Both are trait objects so
//! the writer can be driven by the HTTP client in [`crate::http`] or by a test
//! double.

use async_trait::async_trait;
use std::fmt;

use crate::errors::DeliveryError;
use crate::event::LogEvent;

/// Log group and stream receiving the events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub log_group: String,
    pub log_stream: String,
}

impl Destination {
    pub fn new(log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            log_stream: log_stream.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.log_group, self.log_stream)
    }
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Appends `events`, in order, to `destination`.
    ///
    /// On success returns the token required by the next call, if the service
    /// issued one.
    async fn put_log_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, DeliveryError>;
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates the log group and/or stream named by `destination`.
    async fn create_destination(&self, destination: &Destination) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        let destination = Destination::new("group", "stream");
        assert_eq!(destination.to_string(), "group/stream");
    }
}
