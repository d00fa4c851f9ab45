use crate::error::{Error, Result};
use crate::utils::parse_native;
use std::time::Duration;
use web3::types::{Address, U256};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub name: String,
    pub chain_id: Option<u64>,
    pub endpoint: String,
    pub raffle: Address,
}

/// Cycle tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerOpts {
    /// Active raffles examined per cycle.
    pub batch_size: usize,
    /// How many recent raffle ids the distributor looks back over.
    pub distribute_window: u64,
    /// Seconds after winner selection before distributing.
    pub grace_period: u64,
    /// Pause after each submitted transaction.
    pub tx_delay: Duration,
    /// Percent applied to gas estimates.
    pub gas_headroom: u64,
    pub processed_cache_limit: usize,
    /// Cycles are skipped below this balance (wei).
    pub min_gas_reserve: U256,
}

impl Default for FinalizerOpts {
    fn default() -> Self {
        Self {
            batch_size: 50,
            distribute_window: 100,
            grace_period: 60,
            tx_delay: Duration::from_secs(2),
            gas_headroom: 120,
            processed_cache_limit: 1000,
            min_gas_reserve: U256::from(10_000_000_000_000_000u64),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub chain: Chain,
    pub root_secret: String,
    pub rpc_timeout: u64,
    pub nonce_store: Option<String>,
    pub opts: FinalizerOpts,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("chain", &self.chain)
            .field("root_secret", &"<redacted>")
            .field("rpc_timeout", &self.rpc_timeout)
            .field("nonce_store", &self.nonce_store)
            .field("opts", &self.opts)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{} is not set", key)));

        let root_secret = require("PRIVATE_KEY")?;
        let raffle = require("RAFFLE_CONTRACT")?
            .parse::<Address>()
            .map_err(|e| Error::Config(format!("RAFFLE_CONTRACT: {}", e)))?;
        let chain_id = get("CHAIN_ID")
            .map(|v| v.parse::<u64>().map_err(|e| Error::Config(format!("CHAIN_ID: {}", e))))
            .transpose()?;
        let rpc_timeout = get("RPC_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().map_err(|e| Error::Config(format!("RPC_TIMEOUT_SECS: {}", e))))
            .transpose()?
            .unwrap_or(30);
        let mut opts = FinalizerOpts::default();
        if let Some(reserve) = get("MIN_GAS_RESERVE") {
            opts.min_gas_reserve = parse_native(&reserve)?;
        }

        Ok(Config {
            chain: Chain {
                name: get("CHAIN_NAME").unwrap_or_else(|| "unnamed".to_string()),
                chain_id,
                endpoint: get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
                raffle,
            },
            root_secret,
            rpc_timeout,
            nonce_store: get("NONCE_STORE_URL"),
            opts,
        })
    }
}
