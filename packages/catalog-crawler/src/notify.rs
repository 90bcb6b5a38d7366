//! The outbound notification channel (§7): an external collaborator
//! specified only through the interface the Orchestrator consumes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use catalog_extraction::types::MonitoringRun;

/// Summary handed to the channel when a run completes, successfully or not.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub run: MonitoringRun,
    pub batch_files: Vec<PathBuf>,
}

/// A fatal or failed-run condition (§7: "error notifications are emitted
/// only for fatal conditions or for a MonitoringRun in the failed state").
#[derive(Debug, Clone)]
pub struct ErrorNotice {
    pub run_id: Option<uuid::Uuid>,
    pub message: String,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify_completion(&self, notice: CompletionNotice);

    async fn notify_error(&self, notice: ErrorNotice);

    /// Whether the channel itself is reachable, exposed per §7.
    async fn health_check(&self) -> bool;
}

/// Logs notifications via `tracing` — the channel a deployment without a
/// dedicated outbound integration falls back to, and what the Orchestrator
/// uses in its own tests.
pub struct TracingNotificationChannel;

#[async_trait]
impl NotificationChannel for TracingNotificationChannel {
    async fn notify_completion(&self, notice: CompletionNotice) {
        tracing::info!(
            run_id = %notice.run.id,
            state = ?notice.run.state,
            products_crawled = notice.run.products_crawled,
            new_products_found = notice.run.new_products_found,
            batch_files = ?notice.batch_files,
            "monitoring run completed"
        );
    }

    async fn notify_error(&self, notice: ErrorNotice) {
        tracing::error!(run_id = ?notice.run_id, message = %notice.message, "fatal or failed monitoring run");
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Records notifications in memory, for tests that assert on what would
/// have been sent without a real outbound integration.
#[derive(Default)]
pub struct RecordingNotificationChannel {
    pub completions: Mutex<Vec<CompletionNotice>>,
    pub errors: Mutex<Vec<ErrorNotice>>,
}

impl RecordingNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotificationChannel {
    async fn notify_completion(&self, notice: CompletionNotice) {
        self.completions.lock().unwrap().push(notice);
    }

    async fn notify_error(&self, notice: ErrorNotice) {
        self.errors.lock().unwrap().push(notice);
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_extraction::types::RunType;

    #[tokio::test]
    async fn recording_channel_captures_completion_and_error_notices() {
        let channel = RecordingNotificationChannel::new();
        let run = MonitoringRun::new(RunType::Monitoring, vec!["revolve".to_string()], vec!["dresses".to_string()], chrono::Utc::now());
        channel.notify_completion(CompletionNotice { run: run.clone(), batch_files: Vec::new() }).await;
        channel.notify_error(ErrorNotice { run_id: Some(run.id), message: "boom".to_string() }).await;

        assert_eq!(channel.completions.lock().unwrap().len(), 1);
        assert_eq!(channel.errors.lock().unwrap().len(), 1);
        assert!(channel.health_check().await);
    }
}
