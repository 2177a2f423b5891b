//! In-process broadcast hub for progress events.

use crate::domain::events::ProgressEvent;
use crate::ports::notifier::{ProgressSink, PublishError};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// One broadcast channel per progress channel name, created on first subscribe.
#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for EventHub {
    fn publish(&self, channel: &str, event: ProgressEvent) -> Result<usize, PublishError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(channel) else {
            return Err(PublishError::NoSubscribers(channel.to_string()));
        };
        match sender.send(event) {
            Ok(reached) => Ok(reached),
            Err(_) => {
                // Every receiver is gone.
                debug!(channel, "dropping idle progress channel");
                channels.remove(channel);
                Err(PublishError::NoSubscribers(channel.to_string()))
            }
        }
    }
}
