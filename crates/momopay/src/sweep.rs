// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `momopay sweep`: one retry pass for cron-driven deployments.

use chrono::Utc;
use momopay_config::MomopayConfig;
use momopay_core::MomopayError;
use momopay_pipeline::Services;

use crate::serve::{init_tracing, open_storage};

pub async fn run_sweep(config: MomopayConfig) -> Result<(), MomopayError> {
    init_tracing(&config);

    let storage = open_storage(&config).await?;
    let parser = momopay_parser::build_parser(&config.parser)?;
    // Nothing is delivered here, so the work queue is never read.
    let (services, _work_rx) = Services::build(&config, storage.clone(), parser);

    let report = services.sweeper().sweep_at(Utc::now()).await;
    storage.close().await?;
    let report = report?;

    println!(
        "momopay sweep: retried={} redriven={} failed={}",
        report.retried, report.redriven, report.failed
    );
    Ok(())
}
