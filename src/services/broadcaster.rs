// src/services/broadcaster.rs

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::db::models::ScannerPayload;
use crate::utils::types::Timeframe;

/// Per-timeframe registry of streaming subscribers.
///
/// Subscribers are unbounded channels, so a publish never blocks on a slow
/// client; a subscriber whose receiving end is gone is dropped from the
/// registry on the next publish. Sends are plain channel pushes, which makes
/// every operation safe from worker threads as well as the event loop.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: DashMap<Timeframe, HashMap<Uuid, UnboundedSender<String>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, timeframe: Timeframe, id: Uuid, sender: UnboundedSender<String>) {
        self.subscribers
            .entry(timeframe)
            .or_default()
            .insert(id, sender);
        tracing::debug!(timeframe = %timeframe, %id, "ws subscriber registered");
    }

    pub fn unregister(&self, timeframe: Timeframe, id: Uuid) {
        if let Some(mut entry) = self.subscribers.get_mut(&timeframe) {
            entry.remove(&id);
        }
        tracing::debug!(timeframe = %timeframe, %id, "ws subscriber unregistered");
    }

    /// Fans the payload out to every subscriber of the timeframe. Messages
    /// to one subscriber keep their emission order; a failing send evicts
    /// that subscriber and never affects the others.
    pub fn publish(&self, timeframe: Timeframe, payload: &ScannerPayload) {
        let message = match serde_json::to_string(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(timeframe = %timeframe, error = %e, "failed to encode payload");
                return;
            }
        };

        let Some(mut entry) = self.subscribers.get_mut(&timeframe) else {
            return;
        };
        let before = entry.len();
        entry.retain(|id, sender| {
            let alive = sender.send(message.clone()).is_ok();
            if !alive {
                tracing::debug!(timeframe = %timeframe, %id, "dropping dead ws subscriber");
            }
            alive
        });
        tracing::debug!(
            timeframe = %timeframe,
            delivered = entry.len(),
            dropped = before - entry.len(),
            "scanner payload published"
        );
    }

    /// Publish entry point for code running off the event loop; the registry
    /// and channel sends are already thread-safe, so this is `publish`.
    pub fn publish_from_worker(&self, timeframe: Timeframe, payload: &ScannerPayload) {
        self.publish(timeframe, payload);
    }

    pub fn subscriber_count(&self, timeframe: Timeframe) -> usize {
        self.subscribers
            .get(&timeframe)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }
}
