// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `momopay serve` command implementation.
//!
//! Opens SQLite storage, builds the parser chain and the service graph, then
//! runs the worker pool, the retry sweeper, the event log subscriber, and the
//! HTTP gateway until a shutdown signal arrives.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use momopay_config::MomopayConfig;
use momopay_core::{MomopayError, StorageAdapter};
use momopay_gateway::{GatewayState, start_server};
use momopay_pipeline::{Services, run_worker, spawn_log_subscriber};
use momopay_security::RedactingWriter;
use momopay_storage::SqliteStorage;
use tracing::{info, warn};

use crate::shutdown;

/// How long background tasks get to finish after the gateway stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens and migrates the configured database.
pub async fn open_storage(config: &MomopayConfig) -> Result<Arc<dyn StorageAdapter>, MomopayError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Runs the `momopay serve` command.
pub async fn run_serve(config: MomopayConfig) -> Result<(), MomopayError> {
    init_tracing(&config);

    info!(name = %config.service.name, "starting momopay serve");
    if config.server.webhook_token.is_none() {
        warn!("server.webhook_token is not set; the webhook will reject every delivery");
    }
    if config.server.admin_token.is_none() {
        warn!("server.admin_token is not set; the admin API will reject every request");
    }

    let storage = open_storage(&config).await?;
    let parser = momopay_parser::build_parser(&config.parser)?;
    let (services, work_rx) = Services::build(&config, storage.clone(), parser);

    let cancel = shutdown::install_signal_handler();

    let event_logger = spawn_log_subscriber(&services.events, cancel.clone());
    let worker = tokio::spawn(run_worker(
        services.pipeline.clone(),
        work_rx,
        config.server.worker_concurrency,
        cancel.clone(),
    ));
    let sweeper = tokio::spawn(services.sweeper().run(cancel.clone()));

    let state = GatewayState::new(services.clone(), &config.server);
    let served = start_server(&config.server, state, cancel.clone()).await;

    // A bind failure returns before any signal; stop the background tasks too.
    cancel.cancel();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = tokio::join!(worker, sweeper, event_logger);
    })
    .await;
    if drained.is_err() {
        warn!(
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "background tasks did not stop in time"
        );
    }

    if let Err(e) = services.parser.shutdown().await {
        warn!(error = %e, "parser shutdown failed");
    }
    storage.close().await?;
    info!("momopay stopped");
    served
}

/// Collects configured secrets so the log writer can scrub them.
fn log_secrets(config: &MomopayConfig) -> Arc<RwLock<Vec<String>>> {
    let secrets = Arc::new(RwLock::new(Vec::new()));
    for value in [
        &config.server.webhook_token,
        &config.server.admin_token,
        &config.parser.inference.api_key,
    ]
    .into_iter()
    .flatten()
    {
        RedactingWriter::<std::io::Stderr>::add_secret(&secrets, value.clone());
    }
    secrets
}

/// Installs the global subscriber. `RUST_LOG` wins over `service.log_level`.
pub fn init_tracing(config: &MomopayConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("momopay={},warn", config.service.log_level))
    });
    let secrets = log_secrets(config);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(move || RedactingWriter::new(std::io::stderr(), secrets.clone()))
        .try_init();
    if installed.is_err() {
        eprintln!("momopay: tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_secrets_skips_unset_tokens() {
        let mut config = MomopayConfig::default();
        config.server.webhook_token = Some("relay-secret-1".into());
        let secrets = log_secrets(&config);
        assert_eq!(*secrets.read().unwrap(), vec!["relay-secret-1".to_string()]);
    }

    #[tokio::test]
    async fn open_storage_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MomopayConfig::default();
        config.storage.database_path = dir.path().join("serve.db").to_string_lossy().into_owned();
        let storage = open_storage(&config).await.unwrap();
        assert!(dir.path().join("serve.db").exists());
        storage.close().await.unwrap();
    }
}
