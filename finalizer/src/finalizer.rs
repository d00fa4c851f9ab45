use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use web3::types::U256;

use crate::chain::RaffleChain;
use crate::config::FinalizerOpts;
use crate::raffle::{RaffleStatus, RaffleSummary};
use crate::randomness::{commitment_hash, NonceSource, WeakNonceSource};
use crate::scanner::{scan, RevealTarget, Route};
use crate::store::{MemoryNonceStore, NonceStore, ProcessedCache};
use crate::utils::{format_native, unix_now};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub committed: u32,
    pub revealed: u32,
    pub emergency: u32,
    pub distributed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub scan_failed: bool,
    pub evicted: usize,
}

impl CycleReport {
    fn tally(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Success => {}
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the Running state; nothing was done.
    AlreadyRunning,
    /// Operating balance under the floor; nothing was submitted.
    LowBalance(U256),
    BalanceUnknown,
}

/// State a cycle mutates. Held under the Running guard.
pub struct FinalizerState {
    nonces: Box<dyn NonceStore>,
    processed: ProcessedCache,
    nonce_source: Box<dyn NonceSource>,
}

pub struct Finalizer<C> {
    chain: C,
    opts: FinalizerOpts,
    clock: fn() -> u64,
    state: Mutex<FinalizerState>,
}

impl<C: RaffleChain> Finalizer<C> {
    pub fn new(chain: C, opts: FinalizerOpts) -> Self {
        Self {
            chain,
            opts,
            clock: unix_now,
            state: Mutex::new(FinalizerState {
                nonces: Box::new(MemoryNonceStore::new()),
                processed: ProcessedCache::new(),
                nonce_source: Box::new(WeakNonceSource::new()),
            }),
        }
    }

    pub fn with_nonce_store(mut self, store: Box<dyn NonceStore>) -> Self {
        self.state.get_mut().nonces = store;
        self
    }

    pub fn with_nonce_source(mut self, source: Box<dyn NonceSource>) -> Self {
        self.state.get_mut().nonce_source = source;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn is_running(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub async fn stored_nonce(&self, raffle_id: u64) -> Option<u64> {
        self.state.lock().await.nonces.get(raffle_id).ok().flatten()
    }

    pub async fn processed_ids(&self) -> Vec<u64> {
        self.state.lock().await.processed.ids().collect()
    }

    pub async fn mark_processed(&self, raffle_id: u64) {
        self.state.lock().await.processed.insert(raffle_id);
    }

    /// One full cycle: balance guard, scan, commit, reveal, distribute, evict.
    pub async fn process_raffles(&self) -> CycleOutcome {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(_) => {
                warn!("previous cycle still running, skipping this trigger");
                return CycleOutcome::AlreadyRunning;
            }
        };

        let mut outcome = self.run_cycle(&mut state).await;

        let evicted = state.processed.evict_to(self.opts.processed_cache_limit);
        if evicted > 0 {
            info!("evicted {} ids from processed cache", evicted);
        }
        if let CycleOutcome::Completed(report) = &mut outcome {
            report.evicted = evicted;
        }
        outcome
    }

    async fn run_cycle(&self, state: &mut FinalizerState) -> CycleOutcome {
        let balance = match self.chain.native_balance().await {
            Ok(b) => b,
            Err(e) => {
                error!("balance read failed, skipping cycle: {}", e);
                return CycleOutcome::BalanceUnknown;
            }
        };
        if balance < self.opts.min_gas_reserve {
            warn!(
                "operating balance {} below floor {}, skipping cycle",
                format_native(balance),
                format_native(self.opts.min_gas_reserve)
            );
            return CycleOutcome::LowBalance(balance);
        }

        let now = (self.clock)();
        let mut report = CycleReport::default();

        match scan(&self.chain, now, self.opts.batch_size, &state.processed).await {
            Ok(scanned) => {
                report.scanned = scanned.scanned;
                report.skipped += scanned.skipped as u32;
                if !scanned.needs_commitment.is_empty() || !scanned.needs_reveal.is_empty() {
                    info!(
                        "{} raffles need commitment, {} need reveal",
                        scanned.needs_commitment.len(),
                        scanned.needs_reveal.len()
                    );
                }
                for id in scanned.needs_commitment {
                    let outcome = self.commit(state, id).await;
                    if outcome == ItemOutcome::Success {
                        report.committed += 1;
                    }
                    report.tally(outcome);
                    tokio::time::sleep(self.opts.tx_delay).await;
                }
                for target in scanned.needs_reveal {
                    let (outcome, route) = self.resolve(state, target).await;
                    if outcome == ItemOutcome::Success {
                        match route {
                            Route::Reveal => report.revealed += 1,
                            Route::Emergency => report.emergency += 1,
                        }
                    }
                    report.tally(outcome);
                }
            }
            Err(e) => {
                error!("active raffle scan failed: {}", e);
                report.scan_failed = true;
            }
        }

        self.distribute(now, &mut report).await;

        CycleOutcome::Completed(report)
    }

    async fn commit(&self, state: &mut FinalizerState, raffle_id: u64) -> ItemOutcome {
        let nonce = state.nonce_source.next_nonce();
        let commitment = commitment_hash(nonce);
        // the nonce must be stored before the commitment can land
        if let Err(e) = state.nonces.insert(raffle_id, nonce) {
            error!("raffle {} nonce store write failed: {}", raffle_id, e);
            return ItemOutcome::Failed;
        }

        match self.chain.commit_randomness(raffle_id, commitment).await {
            Ok(tx) => {
                info!("raffle {} committed {:?}, tx {:?}", raffle_id, commitment, tx.hash);
                ItemOutcome::Success
            }
            Err(e) if e.is_commit_race() => {
                warn!("raffle {} was already committed by the contract: {}", raffle_id, e);
                if let Err(e) = state.nonces.remove(raffle_id) {
                    warn!("raffle {} nonce store delete failed: {}", raffle_id, e);
                }
                ItemOutcome::Skipped
            }
            Err(e) => {
                error!("raffle {} commit failed: {}", raffle_id, e);
                ItemOutcome::Failed
            }
        }
    }

    /// Reveal with the stored nonce, or fall back to emergency selection.
    async fn resolve(&self, state: &mut FinalizerState, target: RevealTarget) -> (ItemOutcome, Route) {
        let id = target.id;
        // a stored nonce wins over the scanner's route
        let nonce = match state.nonces.get(id) {
            Ok(n) => n,
            Err(e) => {
                warn!("raffle {} nonce store read failed: {}", id, e);
                None
            }
        };

        let (route, result) = match nonce {
            Some(nonce) => {
                if target.route == Route::Emergency {
                    info!("raffle {} commitment unreadable, revealing stored nonce", id);
                } else {
                    info!("raffle {} revealing stored nonce", id);
                }
                (Route::Reveal, self.chain.reveal_and_select_winner(id, nonce).await)
            }
            None => {
                warn!("raffle {} has no stored nonce, using emergency selection", id);
                (Route::Emergency, self.chain.emergency_select_winner(id).await)
            }
        };

        // the attempt consumed the nonce either way
        if let Err(e) = state.nonces.remove(id) {
            warn!("raffle {} nonce store delete failed: {}", id, e);
        }

        let outcome = match result {
            Ok(tx) => {
                match tx.winner {
                    Some(winner) => info!("raffle {} winner {:?}, tx {:?}", id, winner, tx.hash),
                    None => info!("raffle {} resolved, tx {:?} (no winner event decoded)", id, tx.hash),
                }
                state.processed.insert(id);
                ItemOutcome::Success
            }
            Err(e) => {
                let op = match route {
                    Route::Reveal => "reveal",
                    Route::Emergency => "emergency selection",
                };
                error!("raffle {} {} failed: {}", id, op, e);
                ItemOutcome::Failed
            }
        };
        (outcome, route)
    }

    /// Whether `raffle` can have its reward distributed at `now`.
    pub fn ready_for_distribution(&self, raffle: &RaffleSummary, now: u64) -> bool {
        raffle.has_winner()
            && !raffle.reward_claimed
            && raffle.status == RaffleStatus::Ended
            && now >= raffle.settled_at().saturating_add(self.opts.grace_period)
    }

    async fn distribute(&self, now: u64, report: &mut CycleReport) {
        let total = match self.chain.total_raffle_count().await {
            Ok(total) => total,
            Err(e) => {
                error!("raffle count read failed, skipping distribution: {}", e);
                return;
            }
        };
        let start = total.saturating_sub(self.opts.distribute_window);

        for id in start..=total {
            let raffle = match self.chain.raffle_details(id).await {
                Ok(r) => r,
                Err(e) => {
                    // ids may be zero- or one-based, `total` itself may not exist
                    if id == total {
                        debug!("raffle {} details read failed: {}", id, e);
                    } else {
                        warn!("raffle {} details read failed: {}", id, e);
                    }
                    continue;
                }
            };
            if let RaffleStatus::Unknown(status) = raffle.status {
                if raffle.has_winner() && !raffle.reward_claimed {
                    warn!("raffle {} has unknown status {}, not distributing", id, status);
                }
                continue;
            }
            if !self.ready_for_distribution(&raffle, now) {
                continue;
            }

            match self.chain.distribute_reward(id).await {
                Ok(tx) => {
                    info!("raffle {} reward distributed to {:?}, tx {:?}", id, raffle.winner, tx.hash);
                    report.distributed += 1;
                }
                Err(e) => {
                    error!("raffle {} reward distribution failed: {}", id, e);
                    report.tally(ItemOutcome::Failed);
                }
            }
            tokio::time::sleep(self.opts.tx_delay).await;
        }
    }
}

pub fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => match serde_json::to_string(report) {
            Ok(json) => info!("cycle complete: {}", json),
            Err(e) => info!("cycle complete: {:?} ({})", report, e),
        },
        CycleOutcome::AlreadyRunning => debug!("cycle skipped, already running"),
        CycleOutcome::LowBalance(balance) => debug!("cycle skipped, balance {}", format_native(*balance)),
        CycleOutcome::BalanceUnknown => debug!("cycle skipped, balance unknown"),
    }
}
