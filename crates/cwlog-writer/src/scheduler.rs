// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background task that triggers flushes.
//!
//! The loop waits on three things: the periodic timer, an explicit flush-now
//! signal and cancellation. Cancellation is checked first, and the ticker is
//! owned by the loop, so once the task has been awaited after cancelling no
//! further flush can start.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::flusher::Flusher;

/// Cheap, cloneable handle used to ask the scheduler for an early flush.
#[derive(Clone, Debug)]
pub struct FlushSignal {
    tx: mpsc::Sender<()>,
}

impl FlushSignal {
    /// Requests a flush. Requests made while one is already pending coalesce.
    pub fn notify(&self) {
        // Full means a request is already pending; closed means the scheduler is gone.
        let _ = self.tx.try_send(());
    }
}

pub struct FlushScheduler {
    flusher: Arc<Flusher>,
    interval: Duration,
    rx: mpsc::Receiver<()>,
    cancel_token: CancellationToken,
}

impl FlushScheduler {
    pub fn new(
        flusher: Arc<Flusher>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> (Self, FlushSignal) {
        let (tx, rx) = mpsc::channel(1);
        let scheduler = Self {
            flusher,
            interval,
            rx,
            cancel_token,
        };
        (scheduler, FlushSignal { tx })
    }

    pub async fn run(self) {
        let Self {
            flusher,
            interval: period,
            mut rx,
            cancel_token,
        } = self;

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        debug!("CWLOG | Flush scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => flush(&flusher, "timer").await,
                Some(()) = rx.recv() => flush(&flusher, "signal").await,
            }
        }

        debug!("CWLOG | Flush scheduler stopped");
    }
}

async fn flush(flusher: &Flusher, trigger: &str) {
    // Failures are recorded by the flusher and surface on close.
    if let Err(err) = flusher.flush().await {
        debug!("CWLOG | Flush triggered by {trigger} failed: {err}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::EventBuffer;
    use crate::client::{DeliveryClient, Destination};
    use crate::errors::DeliveryError;
    use crate::event::LogEvent;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryClient for CountingClient {
        async fn put_log_events(
            &self,
            _destination: &Destination,
            _events: &[LogEvent],
            _sequence_token: Option<&str>,
        ) -> Result<Option<String>, DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(n.to_string()))
        }
    }

    fn create_flusher(client: Arc<CountingClient>) -> Arc<Flusher> {
        Arc::new(Flusher::new(
            Destination::new("group", "stream"),
            client,
            None,
            RetryPolicy::default(),
            EventBuffer::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_timer() {
        let client = Arc::new(CountingClient::default());
        let flusher = create_flusher(client.clone());
        flusher.buffer().append("a".to_string(), 0);

        let cancel_token = CancellationToken::new();
        let (scheduler, _signal) =
            FlushScheduler::new(flusher.clone(), Duration::from_secs(2), cancel_token.clone());
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(flusher.buffer().is_empty());

        cancel_token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_signal() {
        let client = Arc::new(CountingClient::default());
        let flusher = create_flusher(client.clone());
        flusher.buffer().append("a".to_string(), 0);

        let cancel_token = CancellationToken::new();
        let (scheduler, signal) =
            FlushScheduler::new(flusher.clone(), Duration::from_secs(60), cancel_token.clone());
        let task = tokio::spawn(scheduler.run());

        signal.notify();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        cancel_token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_flush_after_cancel() {
        let client = Arc::new(CountingClient::default());
        let flusher = create_flusher(client.clone());

        let cancel_token = CancellationToken::new();
        let (scheduler, signal) =
            FlushScheduler::new(flusher.clone(), Duration::from_secs(2), cancel_token.clone());
        let task = tokio::spawn(scheduler.run());

        cancel_token.cancel();
        task.await.unwrap();

        flusher.buffer().append("a".to_string(), 0);
        signal.notify();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(flusher.buffer().len(), 1);
    }
}
