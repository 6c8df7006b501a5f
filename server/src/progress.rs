//! Progress Bus (C10 §4.9), grounded on the teacher's `src-tauri` progress
//! event pattern generalized to a `tokio::sync::broadcast` channel per
//! running scan, fanned out to both the polling `GET /scans/{id}` handler
//! and `WS /ws/scan/{id}` subscribers.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Started { scan_id: i64, total_files: i64 },
    FileProcessed { scan_id: i64, processed: i64, total_files: i64, file_path: String },
    FileFailed { scan_id: i64, processed: i64, total_files: i64, file_path: String, error: String },
    Completed { scan_id: i64, processed: i64, failed: i64 },
    Failed { scan_id: i64, reason: String },
    Cancelled { scan_id: i64 },
}

impl ScanEvent {
    pub fn scan_id(&self) -> i64 {
        match self {
            ScanEvent::Started { scan_id, .. }
            | ScanEvent::FileProcessed { scan_id, .. }
            | ScanEvent::FileFailed { scan_id, .. }
            | ScanEvent::Completed { scan_id, .. }
            | ScanEvent::Failed { scan_id, .. }
            | ScanEvent::Cancelled { scan_id, .. } => *scan_id,
        }
    }
}

/// Holds one broadcast channel per scan currently being tracked. Channels
/// are created lazily on first publish/subscribe and dropped once the last
/// sender and receiver are gone — a late subscriber simply misses a channel
/// that's already closed and falls back to polling scan status from the
/// database.
pub struct ProgressBus {
    channels: DashMap<i64, broadcast::Sender<ScanEvent>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    pub fn publish(&self, event: ScanEvent) {
        let scan_id = event.scan_id();
        let sender = self
            .channels
            .entry(scan_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        // No active receivers is not an error — progress is best-effort.
        let _ = sender.send(event);
    }

    pub fn subscribe(&self, scan_id: i64) -> broadcast::Receiver<ScanEvent> {
        self.channels.entry(scan_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).subscribe()
    }

    /// Called once a scan reaches a terminal state so the channel doesn't
    /// linger forever for scans nobody is watching anymore.
    pub fn retire(&self, scan_id: i64) {
        self.channels.remove(&scan_id);
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe(1);
        bus.publish(ScanEvent::Started { scan_id: 1, total_files: 10 });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.scan_id(), 1);
    }

    #[test]
    fn publish_without_subscriber_does_not_panic() {
        let bus = ProgressBus::new();
        bus.publish(ScanEvent::Cancelled { scan_id: 2 });
    }

    #[test]
    fn retire_removes_channel() {
        let bus = ProgressBus::new();
        let _rx = bus.subscribe(3);
        bus.retire(3);
        assert!(!bus.channels.contains_key(&3));
    }
}
