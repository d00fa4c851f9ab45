//! Cycle behaviour against an in-memory raffle contract.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use finalizer::{
    config::FinalizerOpts,
    error::{Error, Result},
    raffle::{RaffleStatus, RaffleSummary, RandomnessCommitment},
    randomness::{commitment_hash, FixedNonceSource},
    scanner::{scan, RevealTarget, Route},
    scheduler::run_every,
    store::{MemoryNonceStore, NonceStore, ProcessedCache},
    utils::{unix_now, WEI_PER_NATIVE},
    CycleOutcome, Finalizer, RaffleChain, TxOutcome,
};
use tokio::sync::Notify;
use tokio::task::LocalSet;
use web3::types::{Address, H256, U256};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Commit(u64, H256),
    Reveal(u64, u64),
    Emergency(u64),
    Distribute(u64),
}

#[derive(Default)]
struct MockState {
    active: Vec<u64>,
    raffles: HashMap<u64, RaffleSummary>,
    commitments: HashMap<u64, RandomnessCommitment>,
    unreadable_commitments: HashSet<u64>,
    balance: U256,
    fail_active: bool,
    fail_reveal: bool,
    commit_error: Option<String>,
    gate: Option<Rc<Notify>>,
    balance_delay: Duration,
    balance_calls: usize,
    calls: Vec<Call>,
}

struct MockChain {
    state: RefCell<MockState>,
}

fn native(n: u64) -> U256 {
    U256::from(WEI_PER_NATIVE) * n
}

fn open_raffle(id: u64) -> RaffleSummary {
    let now = unix_now();
    RaffleSummary {
        id,
        title: format!("raffle {}", id),
        creator: Address::repeat_byte(1),
        ticket_price: U256::from(1_000u64),
        tickets_sold: 10,
        max_tickets: 100,
        expiration_time: now + 3_600,
        winner: Address::zero(),
        reward_claimed: false,
        status: RaffleStatus::Active,
        created_at: now - 600,
        winner_selected_at: 0,
    }
}

fn sold_out_raffle(id: u64) -> RaffleSummary {
    RaffleSummary {
        tickets_sold: 100,
        ..open_raffle(id)
    }
}

fn won_raffle(id: u64, selected_ago: u64) -> RaffleSummary {
    let now = unix_now();
    RaffleSummary {
        winner: Address::repeat_byte(0x42),
        status: RaffleStatus::Ended,
        // created long ago: only the selection time may gate distribution
        created_at: now - 86_400,
        winner_selected_at: now - selected_ago,
        ..sold_out_raffle(id)
    }
}

fn expired_commitment() -> RandomnessCommitment {
    let now = unix_now();
    RandomnessCommitment {
        commitment: H256::repeat_byte(0xcc),
        commit_time: now - 121,
        revealed: false,
        reveal_deadline: now - 1,
    }
}

impl MockChain {
    fn funded() -> Self {
        let state = MockState {
            balance: native(1),
            ..Default::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    fn with_active(self, raffle: RaffleSummary) -> Self {
        {
            let mut s = self.state.borrow_mut();
            s.active.push(raffle.id);
            s.raffles.insert(raffle.id, raffle);
        }
        self
    }

    fn with_ended(self, raffle: RaffleSummary) -> Self {
        self.state.borrow_mut().raffles.insert(raffle.id, raffle);
        self
    }

    fn with_commitment(self, id: u64, commitment: RandomnessCommitment) -> Self {
        self.state.borrow_mut().commitments.insert(id, commitment);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    fn balance_calls(&self) -> usize {
        self.state.borrow().balance_calls
    }

    fn select_winner(&self, id: u64) {
        let mut s = self.state.borrow_mut();
        s.active.retain(|a| *a != id);
        if let Some(r) = s.raffles.get_mut(&id) {
            r.winner = Address::repeat_byte(0x42);
            r.status = RaffleStatus::Ended;
            r.winner_selected_at = unix_now();
        }
    }
}

fn tx(id: u64) -> TxOutcome {
    TxOutcome {
        hash: H256::from_low_u64_be(id),
        winner: None,
    }
}

impl RaffleChain for MockChain {
    async fn active_raffle_ids(&self) -> Result<Vec<u64>> {
        let s = self.state.borrow();
        if s.fail_active {
            return Err(Error::Contract("node unavailable".to_string()));
        }
        Ok(s.active.clone())
    }

    async fn raffle_details(&self, raffle_id: u64) -> Result<RaffleSummary> {
        self.state
            .borrow()
            .raffles
            .get(&raffle_id)
            .cloned()
            .ok_or_else(|| Error::Reverted(format!("raffle {} does not exist", raffle_id)))
    }

    async fn randomness_commitment(&self, raffle_id: u64) -> Result<RandomnessCommitment> {
        let s = self.state.borrow();
        if s.unreadable_commitments.contains(&raffle_id) {
            return Err(Error::Contract("call exception".to_string()));
        }
        Ok(s.commitments.get(&raffle_id).cloned().unwrap_or_default())
    }

    async fn total_raffle_count(&self) -> Result<u64> {
        Ok(self.state.borrow().raffles.len() as u64)
    }

    async fn native_balance(&self) -> Result<U256> {
        let (gate, delay, balance) = {
            let mut s = self.state.borrow_mut();
            s.balance_calls += 1;
            (s.gate.take(), s.balance_delay, s.balance)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(balance)
    }

    async fn commit_randomness(&self, raffle_id: u64, commitment: H256) -> Result<TxOutcome> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Commit(raffle_id, commitment));
        if let Some(msg) = s.commit_error.clone() {
            return Err(Error::from_chain(msg));
        }
        let now = unix_now();
        s.commitments.insert(
            raffle_id,
            RandomnessCommitment {
                commitment,
                commit_time: now,
                revealed: false,
                reveal_deadline: now + 120,
            },
        );
        Ok(tx(raffle_id))
    }

    async fn reveal_and_select_winner(&self, raffle_id: u64, nonce: u64) -> Result<TxOutcome> {
        let fail = {
            let mut s = self.state.borrow_mut();
            s.calls.push(Call::Reveal(raffle_id, nonce));
            s.fail_reveal
        };
        if fail {
            return Err(Error::Reverted("invalid nonce for commitment".to_string()));
        }
        self.select_winner(raffle_id);
        Ok(TxOutcome {
            winner: Some(Address::repeat_byte(0x42)),
            ..tx(raffle_id)
        })
    }

    async fn emergency_select_winner(&self, raffle_id: u64) -> Result<TxOutcome> {
        self.state.borrow_mut().calls.push(Call::Emergency(raffle_id));
        self.select_winner(raffle_id);
        Ok(tx(raffle_id))
    }

    async fn distribute_reward(&self, raffle_id: u64) -> Result<TxOutcome> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Distribute(raffle_id));
        if let Some(r) = s.raffles.get_mut(&raffle_id) {
            r.reward_claimed = true;
        }
        Ok(tx(raffle_id))
    }
}

fn test_opts() -> FinalizerOpts {
    FinalizerOpts {
        tx_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn new_finalizer(chain: MockChain) -> Finalizer<MockChain> {
    Finalizer::new(chain, test_opts()).with_nonce_source(Box::new(FixedNonceSource::new([777])))
}

fn completed(outcome: CycleOutcome) -> finalizer::CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("cycle did not complete: {:?}", other),
    }
}

#[tokio::test]
async fn test_sold_out_raffle_gets_committed_once() {
    let finalizer = new_finalizer(MockChain::funded().with_active(sold_out_raffle(1)));

    let before = scan(finalizer.chain(), unix_now(), 50, &ProcessedCache::new()).await.unwrap();
    assert_eq!(before.needs_commitment, vec![1]);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.committed, 1);
    assert_eq!(finalizer.chain().calls(), vec![Call::Commit(1, commitment_hash(777))]);
    assert_eq!(finalizer.stored_nonce(1).await, Some(777));

    let after = scan(finalizer.chain(), unix_now(), 50, &ProcessedCache::new()).await.unwrap();
    assert!(after.needs_commitment.is_empty());
    assert!(after.needs_reveal.is_empty());

    // commitment now pending its deadline: a second cycle submits nothing
    completed(finalizer.process_raffles().await);
    assert_eq!(finalizer.chain().calls().len(), 1);
}

#[tokio::test]
async fn test_open_raffle_left_alone() {
    let finalizer = new_finalizer(MockChain::funded().with_active(open_raffle(1)));
    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.scanned, 1);
    assert!(finalizer.chain().calls().is_empty());
}

#[tokio::test]
async fn test_expired_deadline_reveals_stored_nonce() {
    let chain = MockChain::funded()
        .with_active(sold_out_raffle(5))
        .with_commitment(5, expired_commitment());
    let mut store = MemoryNonceStore::new();
    store.insert(5, 424242).unwrap();
    let finalizer = new_finalizer(chain).with_nonce_store(Box::new(store));

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.revealed, 1);
    assert_eq!(report.emergency, 0);
    assert_eq!(finalizer.chain().calls(), vec![Call::Reveal(5, 424242)]);
    assert_eq!(finalizer.stored_nonce(5).await, None);
    assert_eq!(finalizer.processed_ids().await, vec![5]);
}

#[tokio::test]
async fn test_missing_nonce_falls_back_to_emergency() {
    let chain = MockChain::funded()
        .with_active(sold_out_raffle(5))
        .with_commitment(5, expired_commitment());
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.emergency, 1);
    assert_eq!(finalizer.chain().calls(), vec![Call::Emergency(5)]);
    assert_eq!(finalizer.processed_ids().await, vec![5]);
}

#[tokio::test]
async fn test_unreadable_commitment_goes_to_emergency() {
    let chain = MockChain::funded().with_active(sold_out_raffle(8));
    chain.state.borrow_mut().unreadable_commitments.insert(8);
    let finalizer = new_finalizer(chain);

    let report = scan(finalizer.chain(), unix_now(), 50, &ProcessedCache::new()).await.unwrap();
    assert!(report.needs_commitment.is_empty());
    assert_eq!(report.needs_reveal, vec![RevealTarget { id: 8, route: Route::Emergency }]);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.emergency, 1);
    assert_eq!(finalizer.chain().calls(), vec![Call::Emergency(8)]);
}

#[tokio::test]
async fn test_unreadable_commitment_still_reveals_stored_nonce() {
    let chain = MockChain::funded().with_active(sold_out_raffle(8));
    chain.state.borrow_mut().unreadable_commitments.insert(8);
    let mut store = MemoryNonceStore::new();
    store.insert(8, 99).unwrap();
    let finalizer = new_finalizer(chain).with_nonce_store(Box::new(store));

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.revealed, 1);
    assert_eq!(report.emergency, 0);
    assert_eq!(finalizer.chain().calls(), vec![Call::Reveal(8, 99)]);
    assert_eq!(finalizer.stored_nonce(8).await, None);
    assert_eq!(finalizer.processed_ids().await, vec![8]);
}

#[tokio::test]
async fn test_failed_reveal_is_retried_by_emergency() {
    let chain = MockChain::funded()
        .with_active(sold_out_raffle(5))
        .with_commitment(5, expired_commitment());
    chain.state.borrow_mut().fail_reveal = true;
    let mut store = MemoryNonceStore::new();
    store.insert(5, 1).unwrap();
    let finalizer = new_finalizer(chain).with_nonce_store(Box::new(store));

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.failed, 1);
    assert!(finalizer.processed_ids().await.is_empty());
    assert_eq!(finalizer.stored_nonce(5).await, None);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.emergency, 1);
    assert_eq!(finalizer.chain().calls(), vec![Call::Reveal(5, 1), Call::Emergency(5)]);
    assert_eq!(finalizer.processed_ids().await, vec![5]);
}

#[tokio::test]
async fn test_commit_race_is_skipped_not_failed() {
    let chain = MockChain::funded().with_active(sold_out_raffle(3));
    chain.state.borrow_mut().commit_error = Some("execution reverted: Already committed".to_string());
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.committed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(finalizer.stored_nonce(3).await, None);
}

#[tokio::test]
async fn test_commit_failure_does_not_stop_batch() {
    let chain = MockChain::funded().with_active(sold_out_raffle(1)).with_active(sold_out_raffle(2));
    chain.state.borrow_mut().commit_error = Some("insufficient funds for gas".to_string());
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.failed, 2);
    assert_eq!(finalizer.chain().calls().len(), 2);
}

#[tokio::test]
async fn test_batch_is_capped() {
    let mut chain = MockChain::funded();
    for id in 0..60 {
        chain = chain.with_active(sold_out_raffle(id));
    }
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.scanned, 50);
    assert_eq!(report.committed, 50);
    let committed: Vec<u64> = finalizer
        .chain()
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Commit(id, _) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(committed, (0..50).collect::<Vec<_>>());

    // once the first 50 resolve, the remainder is reached
    for id in 0..50 {
        finalizer.chain().select_winner(id);
    }
    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.committed, 10);
}

#[tokio::test]
async fn test_scan_is_idempotent() {
    let chain = MockChain::funded()
        .with_active(sold_out_raffle(1))
        .with_active(open_raffle(2))
        .with_active(sold_out_raffle(3))
        .with_commitment(3, expired_commitment());
    let now = unix_now();
    let first = scan(&chain, now, 50, &ProcessedCache::new()).await.unwrap();
    let second = scan(&chain, now, 50, &ProcessedCache::new()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.needs_commitment, vec![1]);
    assert_eq!(first.needs_reveal, vec![RevealTarget { id: 3, route: Route::Reveal }]);
}

#[tokio::test]
async fn test_unknown_status_skipped() {
    let mut raffle = sold_out_raffle(4);
    raffle.status = RaffleStatus::Unknown(7);
    let finalizer = new_finalizer(MockChain::funded().with_active(raffle));

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.skipped, 1);
    assert!(finalizer.chain().calls().is_empty());
}

#[tokio::test]
async fn test_processed_cache_evicts_lowest() {
    let finalizer = new_finalizer(MockChain::funded());
    for id in 0..1200 {
        finalizer.mark_processed(id).await;
    }

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.evicted, 200);
    assert_eq!(finalizer.processed_ids().await, (200..1200).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_low_balance_skips_all_writes() {
    let chain = MockChain::funded()
        .with_active(sold_out_raffle(1))
        .with_active(sold_out_raffle(5))
        .with_commitment(5, expired_commitment())
        .with_ended(won_raffle(6, 3_600));
    chain.state.borrow_mut().balance = U256::from(5_000_000_000_000_000u64);
    let finalizer = new_finalizer(chain);

    let outcome = finalizer.process_raffles().await;
    assert_eq!(outcome, CycleOutcome::LowBalance(U256::from(5_000_000_000_000_000u64)));
    assert!(finalizer.chain().calls().is_empty());
}

#[tokio::test]
async fn test_overlapping_trigger_is_noop() {
    let gate = Rc::new(Notify::new());
    let chain = MockChain::funded().with_active(sold_out_raffle(1));
    chain.state.borrow_mut().gate = Some(gate.clone());
    let finalizer = new_finalizer(chain);

    let (first, second) = tokio::join!(finalizer.process_raffles(), async {
        assert!(finalizer.is_running());
        let second = finalizer.process_raffles().await;
        gate.notify_one();
        second
    });

    assert_eq!(second, CycleOutcome::AlreadyRunning);
    assert_eq!(completed(first).committed, 1);
    assert_eq!(finalizer.chain().calls().len(), 1);
    assert_eq!(finalizer.chain().balance_calls(), 1);
    assert!(!finalizer.is_running());
}

#[tokio::test]
async fn test_distribution_waits_for_grace_after_selection() {
    let chain = MockChain::funded()
        .with_ended(won_raffle(0, 30))
        .with_ended(won_raffle(1, 61))
        .with_ended(RaffleSummary {
            reward_claimed: true,
            ..won_raffle(2, 3_600)
        })
        .with_ended(RaffleSummary {
            status: RaffleStatus::Active,
            ..won_raffle(3, 3_600)
        });
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.distributed, 1);
    assert_eq!(finalizer.chain().calls(), vec![Call::Distribute(1)]);

    // claimed now, nothing left to pay
    completed(finalizer.process_raffles().await);
    assert_eq!(finalizer.chain().calls().len(), 1);
}

#[tokio::test]
async fn test_scan_failure_still_distributes() {
    let chain = MockChain::funded().with_ended(won_raffle(0, 3_600));
    chain.state.borrow_mut().fail_active = true;
    let finalizer = new_finalizer(chain);

    let report = completed(finalizer.process_raffles().await);
    assert!(report.scan_failed);
    assert_eq!(finalizer.chain().calls(), vec![Call::Distribute(0)]);
}

#[tokio::test]
async fn test_full_lifecycle_commit_then_emergency_after_restart() {
    let chain = MockChain::funded().with_active(sold_out_raffle(9));
    let finalizer = new_finalizer(chain);
    completed(finalizer.process_raffles().await);

    assert_eq!(finalizer.stored_nonce(9).await, Some(777));

    // a new process starts with an empty nonce store; let the deadline pass
    let restarted = {
        let old = finalizer.chain();
        old.state.borrow_mut().commitments.get_mut(&9).unwrap().reveal_deadline = unix_now() - 1;
        let state = std::mem::take(&mut *old.state.borrow_mut());
        new_finalizer(MockChain {
            state: RefCell::new(state),
        })
    };

    let report = completed(restarted.process_raffles().await);
    assert_eq!(report.emergency, 1);
    let calls = restarted.chain().calls();
    assert!(matches!(calls.last(), Some(Call::Emergency(9))));
}

#[tokio::test(start_paused = true)]
async fn test_commits_are_spaced_by_tx_delay() {
    let chain = MockChain::funded().with_active(sold_out_raffle(1)).with_active(sold_out_raffle(2));
    let finalizer =
        Finalizer::new(chain, FinalizerOpts::default()).with_nonce_source(Box::new(FixedNonceSource::new([777])));

    let start = tokio::time::Instant::now();
    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.committed, 2);
    assert_eq!(finalizer.chain().calls().len(), 2);
    // two seconds after each commit, nothing to distribute
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_distributions_are_spaced_by_tx_delay() {
    let chain = MockChain::funded()
        .with_ended(won_raffle(0, 3_600))
        .with_ended(won_raffle(1, 3_600));
    let finalizer = Finalizer::new(chain, FinalizerOpts::default());

    let start = tokio::time::Instant::now();
    let report = completed(finalizer.process_raffles().await);
    assert_eq!(report.distributed, 2);
    assert_eq!(finalizer.chain().calls(), vec![Call::Distribute(0), Call::Distribute(1)]);
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_now_then_every_period() {
    let finalizer = Rc::new(new_finalizer(MockChain::funded()));
    let local = LocalSet::new();
    let res = local
        .run_until(tokio::time::timeout(
            Duration::from_secs(150),
            run_every(finalizer.clone(), Duration::from_secs(60)),
        ))
        .await;
    assert!(res.is_err());
    // t = 0, 60, 120
    assert_eq!(finalizer.chain().balance_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_skips_tick_during_slow_cycle() {
    let chain = MockChain::funded();
    chain.state.borrow_mut().balance_delay = Duration::from_secs(90);
    let finalizer = Rc::new(new_finalizer(chain));
    let local = LocalSet::new();
    let _ = local
        .run_until(tokio::time::timeout(
            Duration::from_secs(150),
            run_every(finalizer.clone(), Duration::from_secs(60)),
        ))
        .await;
    // t = 0 runs until 90, t = 60 finds it running, t = 120 runs
    assert_eq!(finalizer.chain().balance_calls(), 2);
}
