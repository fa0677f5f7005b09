// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background loop that re-dispatches jobs left `queued` after a failed or
//! interrupted dispatch.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jobs::JobLedger;

/// Run [`JobLedger::redispatch_stale`] every `interval` until `cancel` fires.
///
/// Jobs are considered stale once they have sat queued for `stale_after`.
pub async fn run_reconciler(
    ledger: JobLedger,
    interval: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
) {
    info!(
        interval_secs = interval.as_secs(),
        stale_secs = stale_after.as_secs(),
        "dispatch reconciler started"
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match ledger.redispatch_stale(stale_after).await {
            Ok(report) if report.examined == 0 => debug!("no stale jobs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reconciler pass failed"),
        }
    }
    info!("dispatch reconciler stopped");
}
