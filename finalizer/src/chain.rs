use crate::error::Result;
use crate::raffle::{RaffleSummary, RandomnessCommitment};
use serde::Serialize;
use web3::types::{Address, H256, U256};

/// A confirmed mutating call.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutcome {
    pub hash: H256,
    /// Decoded from a `WinnerSelected` log when one was emitted.
    pub winner: Option<Address>,
}

/// Everything the finalizer needs from the raffle contract and the node.
///
/// Mutating calls return once the transaction has one confirmation.
#[allow(async_fn_in_trait)]
pub trait RaffleChain {
    async fn active_raffle_ids(&self) -> Result<Vec<u64>>;

    async fn raffle_details(&self, raffle_id: u64) -> Result<RaffleSummary>;

    /// An all-zero commitment and an error both mean "not committed".
    async fn randomness_commitment(&self, raffle_id: u64) -> Result<RandomnessCommitment>;

    async fn total_raffle_count(&self) -> Result<u64>;

    /// Balance of the operating account, in wei.
    async fn native_balance(&self) -> Result<U256>;

    async fn commit_randomness(&self, raffle_id: u64, commitment: H256) -> Result<TxOutcome>;

    async fn reveal_and_select_winner(&self, raffle_id: u64, nonce: u64) -> Result<TxOutcome>;

    async fn emergency_select_winner(&self, raffle_id: u64) -> Result<TxOutcome>;

    async fn distribute_reward(&self, raffle_id: u64) -> Result<TxOutcome>;
}
