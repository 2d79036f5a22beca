// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::Arc;

/// Failure reported by a [`DeliveryClient`](crate::client::DeliveryClient) or
/// [`Provisioner`](crate::client::Provisioner).
///
/// The variant is what drives retry classification in the flusher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The batch was already accepted by the service.
    #[error("data already accepted (expected sequence token {expected_sequence_token:?})")]
    AlreadyAccepted {
        expected_sequence_token: Option<String>,
    },

    /// The sequence token sent with the batch is not the one the stream expects.
    #[error("invalid sequence token (expected {expected_sequence_token:?})")]
    InvalidSequenceToken {
        expected_sequence_token: Option<String>,
    },

    /// The log group or log stream does not exist.
    #[error("destination not found: {0}")]
    ResourceNotFound(String),

    /// The request can never succeed as sent.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by [`LogWriter`](crate::writer::LogWriter).
///
/// Cloneable so a terminal failure can be recorded once and handed back to
/// every later `flush` or `close` call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read input: {0}")]
    Input(#[source] Arc<io::Error>),

    #[error("failed to deliver log events: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("writer is closed")]
    Closed,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<io::Error> for WriterError {
    fn from(err: io::Error) -> Self {
        WriterError::Input(Arc::new(err))
    }
}

impl From<WriterError> for io::Error {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::Input(inner) => io::Error::new(inner.kind(), WriterError::Input(inner)),
            other => io::Error::other(other),
        }
    }
}
