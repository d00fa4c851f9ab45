pub mod chain;
pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod finalizer;
pub mod raffle;
pub mod randomness;
pub mod scanner;
pub mod scheduler;
pub mod store;
pub mod utils;

use log::info;
use std::time::Duration;
use web3::{
    api::Eth,
    transports::Http,
    types::{Address, BlockNumber, H256, U256, U64},
};

pub use crate::chain::{RaffleChain, TxOutcome};
pub use crate::finalizer::{CycleOutcome, CycleReport, Finalizer, ItemOutcome};
use crate::{
    config::Config,
    contract::RaffleContract,
    error::{Error, Result},
    raffle::{RaffleSummary, RandomnessCommitment},
    utils::{extract_keypair_from_str, format_native, u256_to_u64},
};

/// Web3 client for the operating account.
#[derive(Debug)]
pub struct BlockClient {
    pub eth: Eth<Http>,
    pub root_addr: Address,
    pub raffle: RaffleContract,
    pub config: Config,
}

#[derive(Debug)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub block_number: U64,
    pub raffle_count: u64,
    pub balance: U256,
}

impl NetworkInfo {
    /// Whether the operating balance covers `reserve`.
    pub fn can_pay_gas(&self, reserve: U256) -> bool {
        self.balance >= reserve
    }
}

impl BlockClient {
    pub fn setup(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout))
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        let url = reqwest::Url::parse(config.chain.endpoint.as_str())
            .map_err(|e| Error::Config(format!("RPC_URL {}: {}", config.chain.endpoint, e)))?;
        let transport = Http::with_client(client, url);
        let eth = web3::Web3::new(transport).eth();
        let (root_sk, root_addr) = extract_keypair_from_str(&config.root_secret)?;
        let raffle = RaffleContract::new(
            eth.clone(),
            config.chain.raffle,
            root_sk,
            root_addr,
            config.opts.gas_headroom,
        );

        Ok(Self {
            eth,
            root_addr,
            raffle,
            config: config.clone(),
        })
    }

    pub async fn chain_id(&self) -> Result<u64> {
        u256_to_u64(self.eth.chain_id().await?)
    }

    pub async fn block_number(&self) -> Result<U64> {
        Ok(self.eth.block_number().await?)
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.eth.balance(address, Some(BlockNumber::Latest)).await?)
    }

    /// Confirm we talk to the expected chain and contract before the first cycle.
    pub async fn check_chain(&self) -> Result<NetworkInfo> {
        let chain_id = self.chain_id().await?;
        if let Some(expected) = self.config.chain.chain_id {
            if expected != chain_id {
                return Err(Error::CheckChainErr {
                    expected,
                    actual: chain_id,
                });
            }
        }
        let block_number = self.block_number().await?;
        let raffle_count = self.raffle.total_raffle_count().await?;
        let balance = self.balance(self.root_addr).await?;

        info!(
            "chain_name:{}, chain_id:{}, block_num:{}, endpoint:{}, raffles:{}, raffle_contract:{:?}, operator:{:?}, balance:{}",
            self.config.chain.name,
            chain_id,
            block_number,
            self.config.chain.endpoint,
            raffle_count,
            self.raffle.address(),
            self.root_addr,
            format_native(balance)
        );

        Ok(NetworkInfo {
            chain_id,
            block_number,
            raffle_count,
            balance,
        })
    }
}

impl RaffleChain for BlockClient {
    async fn active_raffle_ids(&self) -> Result<Vec<u64>> {
        self.raffle.active_raffle_ids().await
    }

    async fn raffle_details(&self, raffle_id: u64) -> Result<RaffleSummary> {
        self.raffle.raffle_details(raffle_id).await
    }

    async fn randomness_commitment(&self, raffle_id: u64) -> Result<RandomnessCommitment> {
        self.raffle.randomness_commitment(raffle_id).await
    }

    async fn total_raffle_count(&self) -> Result<u64> {
        self.raffle.total_raffle_count().await
    }

    async fn native_balance(&self) -> Result<U256> {
        self.balance(self.root_addr).await
    }

    async fn commit_randomness(&self, raffle_id: u64, commitment: H256) -> Result<TxOutcome> {
        self.raffle.commit_randomness(raffle_id, commitment).await
    }

    async fn reveal_and_select_winner(&self, raffle_id: u64, nonce: u64) -> Result<TxOutcome> {
        self.raffle.reveal_and_select_winner(raffle_id, nonce).await
    }

    async fn emergency_select_winner(&self, raffle_id: u64) -> Result<TxOutcome> {
        self.raffle.emergency_select_winner(raffle_id).await
    }

    async fn distribute_reward(&self, raffle_id: u64) -> Result<TxOutcome> {
        self.raffle.distribute_reward(raffle_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_reserve_against_startup_balance() {
        let info = NetworkInfo {
            chain_id: 31337,
            block_number: U64::from(12),
            raffle_count: 3,
            balance: U256::from(10_000_000_000_000_000u64),
        };
        assert!(info.can_pay_gas(U256::from(10_000_000_000_000_000u64)));
        assert!(!info.can_pay_gas(U256::from(10_000_000_000_000_001u64)));
    }
}
