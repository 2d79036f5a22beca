// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented writer that ships its input to CloudWatch Logs.
//!
//! # Lifecycle
//!
//! ```text
//!   Open ──close()──> Closing ──> Closed
//! ```
//!
//! - **Open**: writes are split into lines and buffered; the background
//!   scheduler flushes on its timer and whenever a full batch is waiting.
//! - **Closing**: writes are refused, the scheduler is cancelled and awaited,
//!   and the final unterminated line is buffered. If reading the input failed,
//!   that error is the outcome. Otherwise batches are flushed until the buffer
//!   is empty or a flush fails terminally.
//! - **Closed**: the outcome is recorded; later `close` and `flush` calls
//!   return it without doing any work.
//!
//! Nothing is persisted. Events still buffered when the process exits are lost.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::buffer::EventBuffer;
use crate::client::{DeliveryClient, Destination, Provisioner};
use crate::config::WriterConfig;
use crate::errors::WriterError;
use crate::event::{Clock, SystemClock};
use crate::flusher::Flusher;
use crate::retry::RetryPolicy;
use crate::scheduler::{FlushScheduler, FlushSignal};
use crate::splitter::LineSplitter;

// Read buffer size used by `ingest`
const READ_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Ingest {
    splitter: LineSplitter,
    input_error: Option<Arc<io::Error>>,
    lifecycle: Lifecycle,
}

pub struct LogWriterBuilder {
    config: WriterConfig,
    client: Arc<dyn DeliveryClient>,
    provisioner: Option<Arc<dyn Provisioner>>,
    clock: Arc<dyn Clock>,
}

impl LogWriterBuilder {
    /// Collaborator used to create the log group/stream when it is missing.
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration and spawns the flush scheduler on the
    /// current tokio runtime.
    pub fn start(self) -> Result<LogWriter, WriterError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WriterError::Runtime(format!("no tokio runtime available: {e}")))?;

        let config = self.config;
        let flusher = Arc::new(Flusher::new(
            Destination::new(config.log_group.clone(), config.log_stream.clone()),
            self.client,
            self.provisioner,
            RetryPolicy::new(config.max_retries, config.backoff_unit),
            EventBuffer::new(config.batch_limits(), config.empty_lines.clone()),
        ));

        let shutdown = CancellationToken::new();
        let (scheduler, signal) =
            FlushScheduler::new(Arc::clone(&flusher), config.flush_interval, shutdown.clone());
        let scheduler = runtime.spawn(scheduler.run());

        debug!(
            "CWLOG | Writer started for {} (flush interval {} ms)",
            flusher.destination(),
            config.flush_interval.as_millis()
        );

        Ok(LogWriter {
            flusher,
            clock: self.clock,
            ingest: Mutex::new(Ingest {
                splitter: LineSplitter::new(),
                input_error: None,
                lifecycle: Lifecycle::Open,
            }),
            signal,
            shutdown,
            scheduler: Mutex::new(Some(scheduler)),
            outcome: OnceCell::new(),
        })
    }
}

/// Writer delivering newline-delimited input to a log stream.
///
/// Must be created inside a tokio runtime. Call [`LogWriter::close`] to deliver
/// whatever is still buffered; dropping the writer discards it.
pub struct LogWriter {
    flusher: Arc<Flusher>,
    clock: Arc<dyn Clock>,
    ingest: Mutex<Ingest>,
    signal: FlushSignal,
    shutdown: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    outcome: OnceCell<Result<(), WriterError>>,
}

impl LogWriter {
    pub fn new(
        config: WriterConfig,
        client: Arc<dyn DeliveryClient>,
    ) -> Result<Self, WriterError> {
        Self::builder(config, client).start()
    }

    pub fn builder(config: WriterConfig, client: Arc<dyn DeliveryClient>) -> LogWriterBuilder {
        LogWriterBuilder {
            config,
            client,
            provisioner: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Splits `data` into lines and buffers them.
    ///
    /// Returns once every complete line in `data` is buffered. The unterminated
    /// tail is kept for the next write or for `close`.
    pub fn write(&self, data: &[u8]) -> Result<usize, WriterError> {
        let mut ingest = self.lock_ingest();
        if ingest.lifecycle != Lifecycle::Open {
            return Err(WriterError::Closed);
        }

        let lines = ingest.splitter.push(data);
        if !lines.is_empty() {
            self.append_lines(lines);
        }
        Ok(data.len())
    }

    /// Copies `reader` into the writer until end of input.
    ///
    /// A read failure is recorded as the input error: `close` will return it
    /// without delivering anything further.
    pub async fn ingest<R>(&self, reader: &mut R) -> Result<u64, WriterError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    self.write(&buf[..n])?;
                    total += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let err = Arc::new(err);
                    self.record_input_error(Arc::clone(&err));
                    return Err(WriterError::Input(err));
                }
            }
        }
    }

    /// Records that the input source failed before end of input.
    pub fn abort(&self, err: io::Error) {
        self.record_input_error(Arc::new(err));
    }

    /// Asks the scheduler to flush without waiting for the timer.
    pub fn request_flush(&self) {
        self.signal.notify();
    }

    /// Delivers one batch now.
    ///
    /// After `close` has completed, returns its outcome instead.
    pub async fn flush(&self) -> Result<(), WriterError> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }
        self.flusher.flush().await
    }

    /// Stops the writer and delivers everything still buffered.
    ///
    /// Blocks until the buffer is empty or delivery failed terminally. The
    /// outcome is recorded; calling `close` again returns it immediately.
    pub async fn close(&self) -> Result<(), WriterError> {
        self.outcome
            .get_or_init(|| self.shutdown_and_drain())
            .await
            .clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock_ingest().lifecycle
    }

    pub fn buffered_events(&self) -> usize {
        self.flusher.buffer().len()
    }

    /// Bytes buffered, per-event overhead included.
    pub fn buffered_bytes(&self) -> usize {
        self.flusher.buffer().size()
    }

    pub async fn sequence_token(&self) -> Option<String> {
        self.flusher.sequence_token().await
    }

    async fn shutdown_and_drain(&self) -> Result<(), WriterError> {
        let (tail, input_error) = {
            let mut ingest = self.lock_ingest();
            ingest.lifecycle = Lifecycle::Closing;
            (ingest.splitter.finish(), ingest.input_error.clone())
        };

        self.shutdown.cancel();
        let scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(scheduler) = scheduler {
            if let Err(e) = scheduler.await {
                error!("CWLOG | Flush scheduler task failed: {e}");
            }
        }

        let result = match input_error {
            Some(err) => {
                error!("CWLOG | Input failed, not flushing remaining events: {err}");
                Err(WriterError::Input(err))
            }
            None => {
                if let Some(line) = tail {
                    self.append_lines(vec![line]);
                }
                self.flusher.flush_all().await
            }
        };

        self.lock_ingest().lifecycle = Lifecycle::Closed;
        debug!("CWLOG | Writer for {} closed", self.flusher.destination());
        result
    }

    fn append_lines(&self, lines: Vec<String>) {
        let full = {
            let mut buffer = self.flusher.buffer();
            for line in lines {
                buffer.append(line, self.clock.now_millis());
            }
            buffer.has_full_batch()
        };

        if full {
            self.signal.notify();
        }
    }

    fn record_input_error(&self, err: Arc<io::Error>) {
        let mut ingest = self.lock_ingest();
        if ingest.input_error.is_none() {
            ingest.input_error = Some(err);
        }
    }

    fn lock_ingest(&self) -> MutexGuard<'_, Ingest> {
        self.ingest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Writes are buffered synchronously, so every poll is immediately ready.
/// Flushing and shutting down are no-ops here: delivery is scheduled by the
/// writer itself, and closing is the async [`LogWriter::close`].
impl AsyncWrite for LogWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.write(buf).map_err(io::Error::from))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
