//! Long-running background task that settles referrals a failed write left
//! half done: a referee flag missing after the referrer was paid, or a
//! referrer never credited for a referee past the threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::ApiState;

/// Run the reconciliation sweep every `interval` until `shutdown` fires.
pub async fn run(state: Arc<ApiState>, interval: Duration, shutdown: CancellationToken) {
    info!("Referral sweep starting, interval {}s", interval.as_secs());

    loop {
        match state.ledger.reconcile_referrals().await {
            Ok(0) => debug!("Referral sweep: nothing to settle"),
            Ok(settled) => info!("Referral sweep settled {settled} referral(s)"),
            Err(e) => error!("Referral sweep error: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Referral sweep stopped");
}
