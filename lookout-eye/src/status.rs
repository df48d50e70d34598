//! Status/log boundary: human-readable progress and error strings, in order.

use chrono::{DateTime, Utc};
use lookout_core::DetectionBatch;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One status line
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

impl StatusMessage {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            text: text.into(),
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn post(&self, message: StatusMessage);

    /// Raw output of a detection pass, for sinks that show it.
    fn explain(&self, _batch: &DetectionBatch) {}
}

/// Forwards status lines to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn post(&self, message: StatusMessage) {
        info!(target: "lookout::status", "{}", message.text);
    }
}

/// Keeps every line in memory; clones share the log
#[derive(Debug, Default, Clone)]
pub struct MemoryStatus {
    lines: Arc<Mutex<Vec<StatusMessage>>>,
    explained: Arc<Mutex<Vec<DetectionBatch>>>,
}

impl MemoryStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.lines.lock().iter().filter(|m| m.text.contains(needle)).count()
    }

    pub fn explained(&self) -> Vec<DetectionBatch> {
        self.explained.lock().clone()
    }
}

impl StatusSink for MemoryStatus {
    fn post(&self, message: StatusMessage) {
        self.lines.lock().push(message);
    }

    fn explain(&self, batch: &DetectionBatch) {
        self.explained.lock().push(batch.clone());
    }
}

/// Sends status lines (and optionally raw batches) down a channel
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    lines: mpsc::UnboundedSender<StatusMessage>,
    batches: Option<mpsc::UnboundedSender<DetectionBatch>>,
}

impl ChannelStatus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { lines: tx, batches: None }, rx)
    }

    pub fn with_explain(mut self) -> (Self, mpsc::UnboundedReceiver<DetectionBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.batches = Some(tx);
        (self, rx)
    }
}

impl StatusSink for ChannelStatus {
    fn post(&self, message: StatusMessage) {
        if self.lines.send(message).is_err() {
            warn!("Status receiver dropped");
        }
    }

    fn explain(&self, batch: &DetectionBatch) {
        if let Some(tx) = &self.batches {
            let _ = tx.send(batch.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::{Generation, HandleId, PassTicket};

    #[test]
    fn test_memory_status_order() {
        let status = MemoryStatus::new();
        status.post(StatusMessage::now("one"));
        status.post(StatusMessage::now("two"));
        assert_eq!(status.texts(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(status.count_matching("o"), 2);
    }

    #[tokio::test]
    async fn test_channel_status() {
        let (status, mut rx) = ChannelStatus::new();
        let (status, mut batches) = status.with_explain();
        status.post(StatusMessage::now("hello"));
        let ticket = PassTicket { handle: HandleId::new(), generation: Generation(1), sequence: 1 };
        status.explain(&DetectionBatch::new(ticket, vec![]));
        assert_eq!(rx.recv().await.unwrap().text, "hello");
        assert_eq!(batches.recv().await.unwrap().ticket, ticket);
    }

    #[test]
    fn test_channel_status_dropped_receiver() {
        let (status, rx) = ChannelStatus::new();
        drop(rx);
        status.post(StatusMessage::now("nobody listening"));
    }
}
