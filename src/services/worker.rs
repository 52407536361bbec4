use crate::services::share_service::{CleanupCriteria, ShareService};
use crate::services::storage::StorageService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically removes expired, exhausted and orphaned shares.
pub struct BackgroundWorker {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            storage,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (share cleanup every {}s)",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) -> u64 {
        tracing::info!("🧹 Running background share cleanup...");

        match ShareService::cleanup(&self.db, self.storage.as_ref(), CleanupCriteria::all()).await {
            Ok(deleted) => {
                tracing::info!("✅ Background cleanup completed ({} removed)", deleted);
                deleted
            }
            Err(e) => {
                tracing::error!("Background share cleanup failed: {}", e);
                0
            }
        }
    }
}
