use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{error, info};

use kurso_core::repository::SessionRepository;

/// Lifecycle worker: demotes `active` sessions to `past` once their start
/// time has elapsed. Runs one catch-up sweep at startup (repairing staleness
/// accumulated while the process was down), then sweeps on a fixed interval.
/// It never touches registrations and never cancels anything.
pub async fn start_lifecycle_worker(
    sessions: Arc<dyn SessionRepository>,
    sweep_interval: Duration,
    catch_up_on_start: bool,
) {
    info!(interval_secs = sweep_interval.as_secs(), "Lifecycle worker started");

    if catch_up_on_start {
        sweep(sessions.as_ref()).await;
    }

    let mut ticker = time::interval(sweep_interval);
    // The first tick of a tokio interval completes immediately; the catch-up
    // pass above already covered it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(sessions.as_ref()).await;
    }
}

async fn sweep(sessions: &dyn SessionRepository) {
    match sessions.mark_elapsed_past(Utc::now()).await {
        Ok(0) => {}
        Ok(changed) => info!(changed, "sessions transitioned to past"),
        Err(err) => error!("lifecycle sweep failed: {}", err),
    }
}
