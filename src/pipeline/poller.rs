use crate::dispatch::DispatchClient;
use crate::source::scanner::{parse_entries, ParseError};
use crate::storage::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Re-reads the export on a fixed interval and forwards records the cursor
/// has not covered yet.
#[derive(Debug)]
pub struct Poller {
    path: PathBuf,
    interval: Duration,
    cursor: Cursor,
}

impl Poller {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, cursor: Cursor) -> Self {
        Self {
            path: path.into(),
            interval,
            cursor,
        }
    }

    /// Position after the last successful poll.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Read and parse the file once, queueing every new entry in file order.
    ///
    /// The cursor only moves when the whole file parsed.
    pub async fn poll_once(&mut self, client: &DispatchClient) -> Result<usize, PollError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| PollError::Read {
                path: self.path.clone(),
                source,
            })?;

        let mut cursor = self.cursor;
        let entries = parse_entries(&raw, &mut cursor)?;
        self.cursor = cursor;

        let count = entries.len();
        for entry in entries {
            client.enqueue(entry.format_line(), Some(entry.metadata())).await;
        }

        if count > 0 {
            info!(
                count,
                last_time = %self.cursor.last_time,
                last_seq_num = self.cursor.last_seq_num,
                "Queued new entries"
            );
        } else {
            debug!(bytes = raw.len(), "No new entries");
        }
        Ok(count)
    }

    /// Poll until `shutdown` flips to true (or its sender goes away) or a
    /// poll fails. A poll already underway is finished before stopping.
    pub async fn run(
        &mut self,
        client: &DispatchClient,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PollError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Polling started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.poll_once(client).await?;
                }
            }
        }

        info!("Polling stopped");
        Ok(())
    }
}
