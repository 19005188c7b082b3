//! Expiry of read notifications.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::notification::NotificationRepository;

/// Read notifications live this long after `read_at`.
pub const RETENTION_DAYS: i64 = 30;
/// Delay between two sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run one sweep. Returns removed notifications.
pub async fn sweep(repo: &NotificationRepository) -> u64 {
    let before = chrono::Utc::now() - chrono::Duration::days(RETENTION_DAYS);

    match repo.purge_read_before(before).await {
        Ok(removed) => {
            metrics::counter!("notifications_expired_total").increment(removed);
            if removed > 0 {
                tracing::info!(removed, "expired notifications removed");
            }
            removed
        },
        Err(err) => {
            tracing::warn!(error = %err, "notification sweep failed");
            0
        },
    }
}

/// Sweep forever, first run immediately.
pub fn spawn(repo: NotificationRepository, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sweep(&repo).await;
        }
    })
}
