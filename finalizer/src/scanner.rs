//! Classifies active raffles into the work a cycle has to do.

use log::{debug, info, warn};
use serde::Serialize;

use crate::chain::RaffleChain;
use crate::error::Result;
use crate::raffle::{RaffleStatus, RaffleSummary, RandomnessCommitment};
use crate::store::ProcessedCache;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Reveal with the stored nonce, or fall back to emergency selection.
    Reveal,
    /// Commitment could not be read; emergency selection unless a nonce is stored.
    Emergency,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTarget {
    pub id: u64,
    pub route: Route,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NeedsCommitment,
    NeedsReveal(Route),
    Idle,
}

/// `commitment` is `None` when the commitment read failed.
pub fn classify(raffle: &RaffleSummary, commitment: Option<&RandomnessCommitment>, now: u64) -> Classification {
    if raffle.has_winner() {
        return Classification::Idle;
    }
    match commitment {
        Some(c) if c.is_empty() => {
            if raffle.is_closed(now) {
                Classification::NeedsCommitment
            } else {
                Classification::Idle
            }
        }
        Some(c) => {
            if c.is_ready_for_reveal(now) {
                Classification::NeedsReveal(Route::Reveal)
            } else {
                Classification::Idle
            }
        }
        None if raffle.is_closed(now) => Classification::NeedsReveal(Route::Emergency),
        None => Classification::Idle,
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub active: usize,
    pub scanned: usize,
    pub needs_commitment: Vec<u64>,
    pub needs_reveal: Vec<RevealTarget>,
    pub skipped: usize,
}

/// Read up to `batch_size` active raffles and classify them.
///
/// Only a failure to list active ids is returned as an error; per-raffle read
/// failures are logged and the raffle waits for the next cycle.
pub async fn scan<C: RaffleChain>(
    chain: &C,
    now: u64,
    batch_size: usize,
    processed: &ProcessedCache,
) -> Result<ScanReport> {
    let mut ids = chain.active_raffle_ids().await?;
    let mut report = ScanReport {
        active: ids.len(),
        ..Default::default()
    };
    if ids.len() > batch_size {
        info!("{} active raffles, scanning the first {}", ids.len(), batch_size);
        ids.truncate(batch_size);
    }

    for id in ids {
        report.scanned += 1;
        if processed.contains(id) {
            report.skipped += 1;
            continue;
        }
        let raffle = match chain.raffle_details(id).await {
            Ok(r) => r,
            Err(e) => {
                warn!("raffle {} details read failed: {}", id, e);
                report.skipped += 1;
                continue;
            }
        };
        if let RaffleStatus::Unknown(status) = raffle.status {
            warn!("raffle {} has unknown status {}, skipping", id, status);
            report.skipped += 1;
            continue;
        }
        if raffle.has_winner() {
            continue;
        }

        let commitment = match chain.randomness_commitment(id).await {
            Ok(c) => Some(c),
            Err(e) => {
                debug!("raffle {} commitment read failed: {}", id, e);
                None
            }
        };
        match classify(&raffle, commitment.as_ref(), now) {
            Classification::NeedsCommitment => report.needs_commitment.push(id),
            Classification::NeedsReveal(route) => report.needs_reveal.push(RevealTarget { id, route }),
            Classification::Idle => {}
        }
    }

    Ok(report)
}
