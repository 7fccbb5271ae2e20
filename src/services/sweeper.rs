use {
    crate::domain::store::CheckoutStore,
    std::{sync::Arc, time::Duration},
    tokio::{sync::watch, task::JoinHandle},
};

pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Detached best-effort sweep. Failures are logged, never returned.
pub fn spawn_stale_sweep(store: Arc<dyn CheckoutStore>, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move { sweep_once(&*store, ttl).await })
}

async fn sweep_once(store: &dyn CheckoutStore, ttl: Duration) {
    match store.mark_stale_sessions(ttl).await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "marked stale checkout sessions abandoned"),
        Err(e) => tracing::error!(error = %e, "stale session sweep failed"),
    }
}

/// Periodically move stale `pending` sessions to `abandoned`.
pub async fn run_session_sweeper(
    store: Arc<dyn CheckoutStore>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(?ttl, ?interval, "stale session sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stale session sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        sweep_once(&*store, ttl).await;
    }
}
