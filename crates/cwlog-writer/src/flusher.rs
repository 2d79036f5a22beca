// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of buffered events, one batch per flush.
//!
//! A flush takes the delivery lock, drains one batch from the head of the
//! buffer and drives it through the [`RetryPolicy`] until it is accepted or the
//! failure becomes terminal. Holding the delivery lock for the whole flush is
//! what keeps batches in order and the sequence token consistent: a later batch
//! is never drained while an earlier one is still being retried.
//!
//! Each failed attempt is classified:
//!
//! - already accepted: adopt the expected token, treat as success
//! - invalid sequence token: adopt the expected token, retry immediately
//! - destination not found: ask the [`Provisioner`], then a counted retry
//! - rejected: terminal, no retry
//! - anything else: counted retry with backoff
//!
//! A terminal failure is recorded and returned by every later flush without
//! touching the network.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use crate::buffer::EventBuffer;
use crate::client::{DeliveryClient, Destination, Provisioner};
use crate::errors::{DeliveryError, WriterError};
use crate::event::LogEvent;
use crate::retry::{Attempt, RetryOutcome, RetryPolicy};
use crate::sequence::SequenceTracker;

#[derive(Debug, Default)]
struct DeliveryState {
    sequence: SequenceTracker,
    /// Sticky terminal error.
    flush_err: Option<WriterError>,
}

pub struct Flusher {
    destination: Destination,
    client: Arc<dyn DeliveryClient>,
    provisioner: Option<Arc<dyn Provisioner>>,
    retry: RetryPolicy,
    buffer: Mutex<EventBuffer>,
    delivery: tokio::sync::Mutex<DeliveryState>,
}

impl Flusher {
    pub fn new(
        destination: Destination,
        client: Arc<dyn DeliveryClient>,
        provisioner: Option<Arc<dyn Provisioner>>,
        retry: RetryPolicy,
        buffer: EventBuffer,
    ) -> Self {
        Flusher {
            destination,
            client,
            provisioner,
            retry,
            buffer: Mutex::new(buffer),
            delivery: tokio::sync::Mutex::new(DeliveryState::default()),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Locks the event buffer. Never hold the guard across an `.await`.
    pub fn buffer(&self) -> MutexGuard<'_, EventBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn sequence_token(&self) -> Option<String> {
        self.delivery.lock().await.sequence.current().map(str::to_string)
    }

    /// Delivers the next batch, if any.
    pub async fn flush(&self) -> Result<(), WriterError> {
        let mut state = self.delivery.lock().await;
        if let Some(err) = &state.flush_err {
            return Err(err.clone());
        }

        let events = {
            let mut buffer = self.buffer();
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.drain()
        };

        debug!(
            "CWLOG | Flushing {} events to {}",
            events.len(),
            self.destination
        );

        let mut delivery = BatchDelivery {
            client: self.client.as_ref(),
            provisioner: self.provisioner.as_deref(),
            destination: &self.destination,
            events: &events,
            sequence: &mut state.sequence,
        };

        match self.retry.run(&mut delivery).await {
            Ok(()) => {
                debug!("CWLOG | Delivered {} events", events.len());
                Ok(())
            }
            Err(err) => {
                error!(
                    "CWLOG | Giving up on {} events for {}: {err}",
                    events.len(),
                    self.destination
                );
                let err = WriterError::from(err);
                state.flush_err = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Flushes until the buffer is empty or a flush fails.
    pub async fn flush_all(&self) -> Result<(), WriterError> {
        loop {
            self.flush().await?;
            if self.buffer().is_empty() {
                return Ok(());
            }
        }
    }
}

/// One batch in flight.
struct BatchDelivery<'a> {
    client: &'a dyn DeliveryClient,
    provisioner: Option<&'a dyn Provisioner>,
    destination: &'a Destination,
    events: &'a [LogEvent],
    sequence: &'a mut SequenceTracker,
}

impl BatchDelivery<'_> {
    async fn classify(&mut self, err: DeliveryError) -> RetryOutcome {
        if let DeliveryError::AlreadyAccepted {
            expected_sequence_token,
        }
        | DeliveryError::InvalidSequenceToken {
            expected_sequence_token,
        } = &err
        {
            self.sequence
                .adopt_expected(expected_sequence_token.as_ref());
        }

        match err {
            DeliveryError::AlreadyAccepted { .. } => {
                debug!("CWLOG | Batch was already accepted");
                RetryOutcome::Success
            }
            DeliveryError::InvalidSequenceToken { .. } => RetryOutcome::RetryImmediate(err),
            DeliveryError::ResourceNotFound(_) => match self.provisioner {
                Some(provisioner) => {
                    info!("CWLOG | Creating missing destination {}", self.destination);
                    match provisioner.create_destination(self.destination).await {
                        Ok(()) => RetryOutcome::Retry(err),
                        Err(create_err) => RetryOutcome::Retry(create_err),
                    }
                }
                None => RetryOutcome::Retry(err),
            },
            DeliveryError::Rejected(_) => RetryOutcome::Fatal(err),
            DeliveryError::Other(_) => RetryOutcome::Retry(err),
        }
    }
}

#[async_trait]
impl<'a> Attempt for BatchDelivery<'a> {
    async fn attempt(&mut self) -> RetryOutcome {
        let result = self
            .client
            .put_log_events(self.destination, self.events, self.sequence.current())
            .await;

        match result {
            Ok(next) => {
                self.sequence.update(next);
                RetryOutcome::Success
            }
            Err(err) => self.classify(err).await,
        }
    }
}
