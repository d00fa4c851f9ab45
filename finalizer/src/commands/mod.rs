use clap::Parser;
use std::time::Duration;

/// One week.
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Commits, reveals and pays out raffles that are ready.
///
/// Credentials and endpoints come from the environment: PRIVATE_KEY,
/// RAFFLE_CONTRACT, RPC_URL, CHAIN_ID, NONCE_STORE_URL.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Run a single cycle and exit
    #[clap(long)]
    pub(crate) once: bool,

    /// Minutes between cycles
    #[clap(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_MINUTES))]
    pub(crate) interval: u64,
}

impl Cli {
    pub(crate) fn parse_args() -> Self {
        Cli::parse()
    }

    pub(crate) fn period(&self) -> Duration {
        Duration::from_secs(self.interval * 60)
    }
}
