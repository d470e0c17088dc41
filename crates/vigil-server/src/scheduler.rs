//! In-process periodic reconciliation.
//!
//! The first sweep runs immediately; later ones follow at a fixed interval.
//! Ticks missed while a sweep runs long are skipped, not queued.

use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info};
use vigil_core::{
  Engine,
  notify::{Documents, Notifier},
  store::VaultStore,
};

pub fn spawn<S, N, D>(
  engine: Arc<Engine<S, N, D>>,
  every: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
  S: VaultStore + 'static,
  N: Notifier + 'static,
  D: Documents + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_secs = every.as_secs(), "sweep scheduler started");

    loop {
      tokio::select! {
        _ = shutdown_rx.recv() => {
          info!("sweep scheduler shutdown received");
          break;
        }
        _ = ticker.tick() => match engine.reconcile().await {
          Ok(_) => {}
          Err(vigil_core::Error::SweepInProgress) => {
            info!("previous sweep still running; tick skipped");
          }
          Err(e) => error!(error = %e, "scheduled sweep failed"),
        },
      }
    }
  })
}
