//! Export helper: bounded sending queue with per-attempt timeouts and
//! back-off.
//!
//! Batches are buffered in a `tokio::sync::mpsc` channel and drained by a
//! fixed pool of workers. Each worker hands a batch to the [`Consumer`]
//! through [`export_with_retry`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use telehouse_core::SignalKind;

use crate::config::QueueConfig;
use crate::error::ExportError;
use crate::retry::RetryPolicy;

/// Receives exported batches of type `B`.
#[async_trait]
pub trait Consumer<B>: Send + Sync {
    async fn consume(&self, batch: &B) -> Result<(), ExportError>;
}

/// Deliver `batch` to `consumer`, bounding each attempt by `timeout` and
/// retrying transient failures per `policy`.
///
/// Permanent failures return immediately.
#[instrument(name = "export.attempt", skip_all, fields(attempt))]
pub async fn export_with_retry<B, C>(
    consumer: &C,
    batch: &B,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<(), ExportError>
where
    B: Sync,
    C: Consumer<B> + ?Sized,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        tracing::Span::current().record("attempt", attempt);
        let err = match tokio::time::timeout(timeout, consumer.consume(batch)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err,
            Err(_elapsed) => ExportError::Timeout(timeout),
        };

        if err.is_permanent() {
            warn!(attempt, error = %err, "export failed permanently, dropping batch");
            return Err(err);
        }

        let Some(delay) = policy.next_delay(attempt, started.elapsed()) else {
            warn!(
                attempt,
                error = %err,
                retry = policy.is_enabled(),
                "export failed, no retries left"
            );
            return Err(err);
        };

        warn!(
            attempt,
            error = %err,
            delay_ms = %delay.as_millis(),
            "export failed, will retry"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Bounded queue of batches drained by `num_consumers` worker tasks.
pub struct SendingQueue<B> {
    signal: SignalKind,
    sender: Option<mpsc::Sender<B>>,
    workers: Vec<JoinHandle<()>>,
}

impl<B> SendingQueue<B>
where
    B: Send + Sync + 'static,
{
    /// Spawn the workers. Must be called within a Tokio runtime.
    ///
    /// A zero `queue_size` or `num_consumers` is treated as one.
    pub fn start(
        signal: SignalKind,
        config: &QueueConfig,
        consumer: Arc<dyn Consumer<B>>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let policy = Arc::new(policy);

        let workers = (0..config.num_consumers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let consumer = Arc::clone(&consumer);
                let policy = Arc::clone(&policy);
                tokio::spawn(async move {
                    loop {
                        // The lock is released before the batch is exported.
                        let next = receiver.lock().await.recv().await;
                        let Some(batch) = next else { break };
                        if let Err(e) =
                            export_with_retry(consumer.as_ref(), &batch, timeout, &policy).await
                        {
                            warn!(signal = %signal, worker, error = %e, "batch dropped");
                        }
                    }
                    debug!(signal = %signal, worker, "queue worker stopped");
                })
            })
            .collect();

        info!(
            signal = %signal,
            queue_size = config.queue_size,
            num_consumers = config.num_consumers,
            "sending queue started"
        );

        Self {
            signal,
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueue without waiting; refuses when the queue is full.
    pub fn try_send(&self, batch: B) -> Result<(), ExportError> {
        let sender = self.sender.as_ref().ok_or(ExportError::QueueClosed)?;
        sender.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ExportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ExportError::QueueClosed,
        })
    }

    /// Enqueue, waiting for capacity.
    pub async fn send(&self, batch: B) -> Result<(), ExportError> {
        let sender = self.sender.as_ref().ok_or(ExportError::QueueClosed)?;
        sender.send(batch).await.map_err(|_| ExportError::QueueClosed)
    }

    /// Batches currently buffered.
    pub fn len(&self) -> usize {
        self.sender
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting batches and wait for the workers to drain the rest.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(signal = %self.signal, error = %e, "queue worker panicked");
            }
        }
        info!(signal = %self.signal, "sending queue drained");
    }
}
