use crate::cli::logging::{init_tracing, LoggingError};
use crate::config::{load_config, Config, ConfigError, DispatchConfig};
use crate::dispatch::{ClientConfig, DispatchClient, DispatchError};
use crate::pipeline::{PollError, Poller};
use crate::source::timestamp::{origin_timestamp_rebase, TimestampError};
use crate::storage::{Cursor, CursorError, CursorStore};
use chrono::FixedOffset;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "config not found\nSearched locations:\n  ~/.config/logtap/config.yml\n  /etc/logtap/config.yml\n  ./config.yml\n\nUse --config <path> to specify a config file, or run 'logtap config init' to generate one."
    )]
    ConfigNotFound,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("config error: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("poll error: {0}")]
    Poll(#[from] PollError),
}

impl RunError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::ConfigNotFound | RunError::Config(_) | RunError::Timestamp(_) => 2,
            _ => 1,
        }
    }
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config_path = config_path.ok_or(RunError::ConfigNotFound)?;
    let config = load_config(&config_path)?;

    init_tracing(&config.service)?;
    info!(config_path = %config_path.display(), "Loaded configuration");

    run_with_config(config, shutdown_signal()).await
}

/// Run the tailer until `shutdown` resolves or a poll fails.
///
/// Whatever happens, the cursor of the last good poll is saved and the
/// dispatch queue is drained before returning.
pub async fn run_with_config<F>(config: Config, shutdown: F) -> Result<(), RunError>
where
    F: Future<Output = ()>,
{
    let start_time = config.source.start_time()?;
    let utc_offset = config.source.utc_offset()?;

    let store = CursorStore::new(&config.cursor.path);
    let persisted = store.load()?;
    let cursor = Cursor::resume_from(persisted, start_time);
    info!(
        last_time = %cursor.last_time,
        last_seq_num = cursor.last_seq_num,
        "Resuming"
    );

    let client = DispatchClient::new(client_config(&config.dispatch, utc_offset))?;
    info!(push_url = %config.dispatch.push_url, "Dispatch client started");

    let mut poller = Poller::new(&config.source.path, config.source.interval, cursor);
    let (stop_tx, stop_rx) = watch::channel(false);

    let result = {
        let polling = poller.run(&client, stop_rx);
        tokio::pin!(polling);

        tokio::select! {
            result = &mut polling => result,
            _ = shutdown => {
                warn!("Shutdown signal received, finishing current poll");
                let _ = stop_tx.send(true);
                polling.await
            }
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Polling failed");
    }

    let cursor = poller.cursor();
    match store.save(&cursor) {
        Ok(()) => info!(
            path = %store.path().display(),
            last_time = %cursor.last_time,
            last_seq_num = cursor.last_seq_num,
            "Cursor saved"
        ),
        Err(e) => error!(error = %e, "Failed to save cursor"),
    }

    client.shutdown().await;
    warn!("Shutdown complete");

    result.map_err(RunError::from)
}

fn client_config(dispatch: &DispatchConfig, utc_offset: FixedOffset) -> ClientConfig {
    ClientConfig {
        push_url: dispatch.push_url.clone(),
        labels: dispatch.labels.clone(),
        batch_wait: dispatch.batch_wait,
        batch_max_size: dispatch.batch_size,
        queue_capacity: dispatch.queue_capacity,
        rebase: dispatch
            .push_origin_ts
            .then(|| origin_timestamp_rebase(utc_offset)),
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
