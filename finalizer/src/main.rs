mod commands;

use std::rc::Rc;

use commands::Cli;
use finalizer::{
    config::Config,
    db::RedisNonceStore,
    finalizer::{log_outcome, Finalizer},
    scheduler::run_every,
    utils::format_native,
    BlockClient,
};
use log::{info, warn};
use tokio::task::LocalSet;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse_args();
    let config = Config::from_env()?;

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();
    local.block_on(&rt, run(cli, config))
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let client = BlockClient::setup(&config)?;
    let network = client.check_chain().await?;
    if !network.can_pay_gas(config.opts.min_gas_reserve) {
        warn!(
            "operator balance {} below floor {}, cycles will be skipped until funded",
            format_native(network.balance),
            format_native(config.opts.min_gas_reserve)
        );
    }

    let mut finalizer = Finalizer::new(client, config.opts.clone());
    if let Some(url) = &config.nonce_store {
        let store = RedisNonceStore::open(url)?;
        info!("nonces kept in {}", store);
        finalizer = finalizer.with_nonce_store(Box::new(store));
    }

    if cli.once {
        log_outcome(&finalizer.process_raffles().await);
        return Ok(());
    }

    tokio::select! {
        _ = run_every(Rc::new(finalizer), cli.period()) => {}
        res = shutdown_signal() => {
            res?;
            info!("shutdown signal received, exiting");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
