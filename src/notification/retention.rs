//! Ledger retention sweep
//!
//! Entries older than the cool-down can no longer suppress anything, so each
//! cycle purges them before gating.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::ledger::Ledger;

/// Remove ledger rows with `delivered_at < now - cool_down`
pub async fn sweep(ledger: &dyn Ledger, cool_down: Duration) -> Result<usize> {
    sweep_at(ledger, cool_down, Utc::now()).await
}

/// Same as [`sweep`] with an explicit clock
pub async fn sweep_at(ledger: &dyn Ledger, cool_down: Duration, now: DateTime<Utc>) -> Result<usize> {
    // cutoff before the representable range: nothing can be older
    let Some(cutoff) = now.checked_sub_signed(cool_down) else {
        return Ok(0);
    };
    let removed = ledger.purge_older_than(cutoff).await?;
    if removed > 0 {
        info!(removed, cutoff = %cutoff, "Swept expired ledger entries");
    }
    Ok(removed)
}
