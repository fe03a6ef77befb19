use crate::Reconciler;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time};
use tracing::{debug, info, info_span, Instrument};

/// A reconciler shared between the scheduler and manual sync requests.
///
/// Whoever holds the lock runs a pass; everyone else queues behind it.
pub type SharedReconciler = Arc<Mutex<Reconciler>>;

/// Ticks the reconciler every `period` until `shutdown` completes.
///
/// The first tick runs immediately. A tick that is in flight when `shutdown`
/// fires runs to completion; the value `shutdown` resolves to is held until
/// then, so a drain handle can be passed in to delay process exit.
pub async fn run<F: Future>(reconciler: SharedReconciler, period: Duration, shutdown: F) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut ticks = 0u64;
    let _release = loop {
        tokio::select! {
            biased;
            release = &mut shutdown => break release,
            _ = interval.tick() => {}
        }

        ticks += 1;
        let mut reconciler = reconciler.lock().await;
        let report = reconciler
            .tick()
            .instrument(info_span!("tick", n = ticks))
            .await;
        debug!(?report);
    };
    info!(ticks, "Scheduler stopped");
}
