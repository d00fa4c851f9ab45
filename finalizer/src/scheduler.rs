use log::info;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::chain::RaffleChain;
use crate::finalizer::{log_outcome, Finalizer};

/// Run a cycle now and then every `period`, forever.
///
/// Each cycle is spawned as a local task, so this must run inside a
/// `tokio::task::LocalSet`. A tick that lands while a cycle is still running
/// finds the finalizer busy and does nothing.
pub async fn run_every<C>(finalizer: Rc<Finalizer<C>>, period: Duration)
where
    C: RaffleChain + 'static,
{
    info!("scheduling a cycle every {:?}", period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let finalizer = finalizer.clone();
        tokio::task::spawn_local(async move {
            let outcome = finalizer.process_raffles().await;
            log_outcome(&outcome);
        });
    }
}
