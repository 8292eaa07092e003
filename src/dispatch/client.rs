//! Batching push client.
//!
//! Producers call [`DispatchClient::enqueue`]; a single background worker owns
//! the current batch and flushes it when it reaches `batch_max_size` or when
//! `batch_wait` passes without a size flush. Delivery is at-most-once: a batch
//! that fails to send is logged and dropped.

use crate::dispatch::transport::{HttpTransport, Transport, TransportError};
use crate::dispatch::wire::{LogValue, PushRequest};
use crate::source::entry::{unix_nanos, Metadata};
use crate::source::timestamp::TimestampError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Default bound of the queue between producers and the worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// Computes a record's timestamp (Unix nanoseconds) from its line and metadata.
pub type RebaseFn =
    Arc<dyn Fn(&str, Option<&Metadata>) -> Result<String, TimestampError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone)]
pub struct ClientConfig {
    pub push_url: String,
    pub labels: BTreeMap<String, String>,
    pub batch_wait: Duration,
    pub batch_max_size: usize,
    pub queue_capacity: usize,
    /// When set, replaces the enqueue wall-clock time as the record timestamp.
    pub rebase: Option<RebaseFn>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("push_url", &self.push_url)
            .field("labels", &self.labels)
            .field("batch_wait", &self.batch_wait)
            .field("batch_max_size", &self.batch_max_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("rebase", &self.rebase.is_some())
            .finish()
    }
}

/// Handle to the dispatch worker. Not cloneable; [`shutdown`](Self::shutdown)
/// consumes it.
pub struct DispatchClient {
    entries: mpsc::Sender<LogValue>,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
    rebase: Option<RebaseFn>,
}

impl DispatchClient {
    /// Start a client pushing over HTTP to `config.push_url`.
    pub fn new(config: ClientConfig) -> Result<Self, DispatchError> {
        let transport = HttpTransport::new(config.push_url.clone())?;
        Ok(Self::with_transport(config, transport))
    }

    /// Start a client delivering through `transport`. Must be called inside a
    /// tokio runtime.
    pub fn with_transport<T: Transport>(config: ClientConfig, transport: T) -> Self {
        let (entries_tx, entries_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = BatchWorker {
            transport,
            labels: config.labels,
            batch_wait: config.batch_wait,
            batch_max_size: config.batch_max_size.max(1),
        };

        info!(
            batch_wait_ms = worker.batch_wait.as_millis() as u64,
            batch_max_size = worker.batch_max_size,
            queue_capacity = config.queue_capacity,
            "Starting dispatch worker"
        );
        let worker = tokio::spawn(worker.run(entries_rx, shutdown_rx));

        Self {
            entries: entries_tx,
            shutdown: shutdown_tx,
            worker,
            rebase: config.rebase,
        }
    }

    /// Queue one line for delivery, waiting while the queue is full.
    ///
    /// If the rebase hook fails the record is dropped.
    pub async fn enqueue(&self, line: String, metadata: Option<Metadata>) {
        let timestamp = match &self.rebase {
            Some(rebase) => match rebase(&line, metadata.as_ref()) {
                Ok(ts) => ts,
                Err(e) => {
                    error!(error = %e, "Failed to compute record timestamp, dropping record");
                    return;
                }
            },
            None => unix_nanos(&Utc::now()).to_string(),
        };

        let value = LogValue {
            timestamp,
            line,
            metadata,
        };
        if self.entries.send(value).await.is_err() {
            error!("Dispatch worker is not running, dropping record");
        }
    }

    /// Stop the worker after it has flushed everything already queued.
    pub async fn shutdown(self) {
        let Self {
            entries,
            shutdown,
            worker,
            ..
        } = self;

        let _ = shutdown.send(());
        drop(entries);

        if let Err(e) = worker.await {
            error!(error = %e, "Dispatch worker task failed");
        }
    }
}

struct BatchWorker<T> {
    transport: T,
    labels: BTreeMap<String, String>,
    batch_wait: Duration,
    batch_max_size: usize,
}

impl<T: Transport> BatchWorker<T> {
    async fn run(
        self,
        mut entries: mpsc::Receiver<LogValue>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut batch: Vec<LogValue> = Vec::with_capacity(self.batch_max_size);
        let timer = tokio::time::sleep(self.batch_wait);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Dispatch worker received shutdown signal");
                    break;
                }

                received = entries.recv() => match received {
                    Some(value) => {
                        batch.push(value);
                        if batch.len() >= self.batch_max_size {
                            self.send(self.take_batch(&mut batch)).await;
                            timer.as_mut().reset(Instant::now() + self.batch_wait);
                        }
                    }
                    None => break,
                },

                _ = timer.as_mut() => {
                    if !batch.is_empty() {
                        self.send(self.take_batch(&mut batch)).await;
                    }
                    timer.as_mut().reset(Instant::now() + self.batch_wait);
                }
            }
        }

        // Nothing new can arrive once the queue is closed; flush what is left.
        entries.close();
        while let Some(value) = entries.recv().await {
            batch.push(value);
            if batch.len() >= self.batch_max_size {
                self.send(self.take_batch(&mut batch)).await;
            }
        }
        if !batch.is_empty() {
            self.send(self.take_batch(&mut batch)).await;
        }

        info!("Dispatch worker stopped");
    }

    fn take_batch(&self, batch: &mut Vec<LogValue>) -> Vec<LogValue> {
        std::mem::replace(batch, Vec::with_capacity(self.batch_max_size))
    }

    async fn send(&self, values: Vec<LogValue>) {
        let count = values.len();
        let request = PushRequest::single_stream(self.labels.clone(), values);

        match self.transport.push(&request).await {
            Ok(()) => debug!(count, "Batch delivered"),
            Err(e) => error!(count, error = %e, "Failed to deliver batch, dropping it"),
        }
    }
}
