// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

/// Holds the continuation token for the next `PutLogEvents` call.
///
/// The token is absent only before the first delivery to a brand-new stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceTracker {
    token: Option<String>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Adopts the token returned by a successful delivery.
    pub fn update(&mut self, next: Option<String>) {
        self.token = next;
    }

    /// Adopts the token the service said it expected.
    ///
    /// A missing expected token leaves the current one in place.
    pub fn adopt_expected(&mut self, expected: Option<&String>) {
        if let Some(expected) = expected {
            debug!("CWLOG | Adopting expected sequence token {expected}");
            self.token = Some(expected.clone());
        }
    }
}
