use lazy_static::lazy_static;
use log::debug;
use tokio::sync::Semaphore;
use web3::contract::tokens::{Detokenize, Tokenizable, Tokenize};
use web3::contract::{Contract, Options};
use web3::ethabi::{self, RawLog, Token};
use web3::signing::SecretKey;
use web3::transports::Http;
use web3::types::{Address, Log, H256, U256, U64};

use crate::chain::TxOutcome;
use crate::error::{Error, Result};
use crate::raffle::{RaffleSummary, RandomnessCommitment};
use crate::utils::{u256_to_u64, with_headroom};

lazy_static! {
    pub static ref RAFFLE_ABI: ethabi::Contract =
        ethabi::Contract::load(include_bytes!("../abi/RaffleV4.json").as_slice()).expect("embedded raffle abi");
}

const WINNER_SELECTED: &str = "WinnerSelected";

#[derive(Debug, Clone, Default)]
pub struct CommitData {
    pub raffle_id: u64,
    pub commitment: H256,
}

impl Tokenize for CommitData {
    fn into_tokens(self) -> Vec<Token> {
        vec![U256::from(self.raffle_id).into_token(), Token::FixedBytes(self.commitment.as_bytes().to_vec())]
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevealData {
    pub raffle_id: u64,
    pub nonce: u64,
}

impl Tokenize for RevealData {
    fn into_tokens(self) -> Vec<Token> {
        vec![U256::from(self.raffle_id).into_token(), U256::from(self.nonce).into_token()]
    }
}

/// Handle on the deployed raffle contract, signing as the operating account.
#[derive(Debug)]
pub struct RaffleContract {
    contract: Contract<Http>,
    sec_key: SecretKey,
    from: Address,
    gas_headroom: u64,
    // one mutating call in flight per signing account
    tx_slot: Semaphore,
}

impl RaffleContract {
    pub fn new(eth: web3::api::Eth<Http>, address: Address, sec_key: SecretKey, from: Address, gas_headroom: u64) -> Self {
        Self {
            contract: Contract::new(eth, address, RAFFLE_ABI.clone()),
            sec_key,
            from,
            gas_headroom,
            tx_slot: Semaphore::new(1),
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    async fn query<R, P>(&self, func: &str, params: P) -> Result<R>
    where
        R: Detokenize,
        P: Tokenize,
    {
        Ok(self.contract.query(func, params, self.from, Options::default(), None).await?)
    }

    pub async fn active_raffle_ids(&self) -> Result<Vec<u64>> {
        let ids: Vec<U256> = self.query("getActiveRaffleIds", ()).await?;
        ids.into_iter().map(u256_to_u64).collect()
    }

    pub async fn raffle_details(&self, raffle_id: u64) -> Result<RaffleSummary> {
        self.query("getRaffleDetails", U256::from(raffle_id)).await
    }

    pub async fn randomness_commitment(&self, raffle_id: u64) -> Result<RandomnessCommitment> {
        self.query("getRandomnessCommitment", U256::from(raffle_id)).await
    }

    pub async fn total_raffle_count(&self) -> Result<u64> {
        let total: U256 = self.query("getTotalRaffleCount", ()).await?;
        u256_to_u64(total)
    }

    pub async fn commit_randomness(&self, raffle_id: u64, commitment: H256) -> Result<TxOutcome> {
        self.submit("commitRandomness", CommitData { raffle_id, commitment }).await
    }

    pub async fn reveal_and_select_winner(&self, raffle_id: u64, nonce: u64) -> Result<TxOutcome> {
        self.submit("revealAndSelectWinner", RevealData { raffle_id, nonce }).await
    }

    pub async fn emergency_select_winner(&self, raffle_id: u64) -> Result<TxOutcome> {
        self.submit("emergencySelectWinner", U256::from(raffle_id)).await
    }

    pub async fn distribute_reward(&self, raffle_id: u64) -> Result<TxOutcome> {
        self.submit("distributeReward", U256::from(raffle_id)).await
    }

    /// Estimate, pad, sign, send and wait for one confirmation.
    async fn submit<P>(&self, func: &str, params: P) -> Result<TxOutcome>
    where
        P: Tokenize + Clone,
    {
        let _slot = self
            .tx_slot
            .acquire()
            .await
            .map_err(|e| Error::Unknown(e.to_string()))?;

        let estimate = self
            .contract
            .estimate_gas(func, params.clone(), self.from, Options::default())
            .await?;
        let opt = Options {
            gas: Some(with_headroom(estimate, self.gas_headroom)),
            ..Default::default()
        };
        debug!("{} estimate {} gas limit {:?}", func, estimate, opt.gas);

        let receipt = self
            .contract
            .signed_call_with_confirmations(func, params, opt, 1, &self.sec_key)
            .await?;
        if receipt.status == Some(U64::from(0)) {
            return Err(Error::Reverted(format!("{} tx {:?}", func, receipt.transaction_hash)));
        }

        Ok(TxOutcome {
            hash: receipt.transaction_hash,
            winner: decode_winner_selected(&receipt.logs),
        })
    }
}

/// Winner address from the first `WinnerSelected` log, if any decodes.
pub fn decode_winner_selected(logs: &[Log]) -> Option<Address> {
    let event = RAFFLE_ABI.event(WINNER_SELECTED).ok()?;
    let signature = event.signature();
    logs.iter()
        .filter(|log| log.topics.first() == Some(&signature))
        .find_map(|log| {
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.0.clone(),
            };
            match event.parse_log(raw) {
                Ok(parsed) => parsed
                    .params
                    .into_iter()
                    .find(|p| p.name == "winner")
                    .and_then(|p| p.value.into_address()),
                Err(e) => {
                    debug!("undecodable {} log: {}", WINNER_SELECTED, e);
                    None
                }
            }
        })
}
