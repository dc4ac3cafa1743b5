use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub inserted: i64,
    pub updated: i64,
    pub kept: i64,
    pub deleted: i64,
    pub skipped: i64,
    pub failed: i64,
}

/// The `{type, counts, timestamp}` wire shape published to every
/// subscriber. `serde`'s externally-tagged enum representation gives the
/// `"type"` discriminant for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { sync_job_id: Uuid, timestamp: DateTime<Utc> },
    Counts { sync_job_id: Uuid, counts: ProgressCounts, timestamp: DateTime<Utc> },
    Heartbeat { sync_job_id: Uuid, timestamp: DateTime<Utc> },
    Info { message: String, timestamp: DateTime<Utc> },
    Completed { sync_job_id: Uuid, counts: ProgressCounts, timestamp: DateTime<Utc> },
    Failed { sync_job_id: Uuid, error: String, timestamp: DateTime<Utc> },
}

/// One publisher per sync job. Subscribing is entirely optional — a
/// `broadcast::Sender` with no receivers just drops the event, so
/// `Orchestrator::run` never branches on whether anyone is listening.
pub struct ProgressPublisher {
    sender: broadcast::Sender<ProgressEvent>,
    sync_job_id: Uuid,
    disabled: bool,
    info_sent: AtomicBool,
    heartbeat: Option<JoinHandle<()>>,
}

impl ProgressPublisher {
    pub fn new(sync_job_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(256);
        let mut publisher =
            Self { sender, sync_job_id, disabled: false, info_sent: AtomicBool::new(false), heartbeat: None };
        publisher.spawn_heartbeat();
        publisher
    }

    /// A publisher that emits one `Info` event on its first publish call
    /// and then no-ops forever, for syncs run with monitoring disabled.
    /// The event is deferred to first-publish rather than sent eagerly at
    /// construction, so a caller that subscribes right after constructing
    /// the publisher (the normal sequencing) still observes it.
    pub fn disabled(sync_job_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender, sync_job_id, disabled: true, info_sent: AtomicBool::new(false), heartbeat: None }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ProgressEvent) {
        if self.disabled {
            if !self.info_sent.swap(true, Ordering::SeqCst) {
                let _ = self.sender.send(ProgressEvent::Info {
                    message: "monitoring disabled".to_string(),
                    timestamp: Utc::now(),
                });
            }
            return;
        }
        let _ = self.sender.send(event);
    }

    pub fn publish_counts(&self, counts: ProgressCounts) {
        self.publish(ProgressEvent::Counts { sync_job_id: self.sync_job_id, counts, timestamp: Utc::now() });
    }

    fn spawn_heartbeat(&mut self) {
        let sender = self.sender.clone();
        let sync_job_id = self.sync_job_id;
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                let _ = sender.send(ProgressEvent::Heartbeat { sync_job_id, timestamp: Utc::now() });
            }
        }));
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_counts() {
        let publisher = ProgressPublisher::new(Uuid::new_v4());
        let mut receiver = publisher.subscribe();
        publisher.publish_counts(ProgressCounts { inserted: 3, ..Default::default() });
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, ProgressEvent::Counts { counts, .. } if counts.inserted == 3));
    }

    #[tokio::test]
    async fn disabled_publisher_only_emits_one_info_event() {
        let publisher = ProgressPublisher::disabled(Uuid::new_v4());
        let mut receiver = publisher.subscribe();
        publisher.publish_counts(ProgressCounts::default());
        let first = receiver.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::Info { .. }));
        publisher.publish_counts(ProgressCounts::default());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn publishing_with_no_subscribers_does_not_panic() {
        let publisher = ProgressPublisher::new(Uuid::new_v4());
        publisher.publish_counts(ProgressCounts::default());
    }
}
