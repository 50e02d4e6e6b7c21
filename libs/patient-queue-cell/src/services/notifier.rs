use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::QueueEvent;

pub type QueueEventSender = broadcast::Sender<String>;
pub type QueueEventReceiver = broadcast::Receiver<String>;

/// Fire-and-forget destination for queue events. Implementations must not
/// block; delivery is best effort.
pub trait QueueEventSink: Send + Sync {
    fn publish(&self, event: QueueEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl QueueEventSink for NoopEventSink {
    fn publish(&self, _event: QueueEvent) {}
}

/// In-process fan-out of serialized events: one channel per doctor for
/// waiting-room displays plus a global channel for dashboards.
pub struct BroadcastNotifier {
    channels: Arc<RwLock<HashMap<Uuid, QueueEventSender>>>,
    global_sender: QueueEventSender,
    channel_capacity: usize,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global_sender, _) = broadcast::channel(capacity);

        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global_sender,
            channel_capacity: capacity,
        }
    }

    pub fn subscribe_global(&self) -> QueueEventReceiver {
        self.global_sender.subscribe()
    }

    pub fn subscribe_doctor(&self, doctor_id: Uuid) -> QueueEventReceiver {
        let mut channels = self.channels.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = channels.entry(doctor_id).or_insert_with(|| {
            debug!("Created queue event channel for doctor {}", doctor_id);
            broadcast::channel(self.channel_capacity).0
        });
        sender.subscribe()
    }

    pub fn remove_channel(&self, doctor_id: Uuid) {
        let mut channels = self.channels.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.remove(&doctor_id);
        debug!("Removed queue event channel for doctor {}", doctor_id);
    }

    pub fn get_active_channels(&self) -> Vec<Uuid> {
        let channels = self.channels.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.keys().cloned().collect()
    }
}

impl QueueEventSink for BroadcastNotifier {
    fn publish(&self, event: QueueEvent) {
        let doctor_id = event.doctor_id();
        let message = match serde_json::to_string(&event) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to serialize {} event for doctor {}: {}", event.kind(), doctor_id, e);
                return;
            }
        };

        {
            let channels = self.channels.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(sender) = channels.get(&doctor_id) {
                if let Err(e) = sender.send(message.clone()) {
                    debug!("No live subscribers for doctor {}: {}", doctor_id, e);
                }
            }
        }

        if let Err(e) = self.global_sender.send(message) {
            debug!("Failed to send to global channel: {}", e);
        }

        debug!("Published {} event for doctor {}", event.kind(), doctor_id);
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Clone for BroadcastNotifier {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            global_sender: self.global_sender.clone(),
            channel_capacity: self.channel_capacity,
        }
    }
}
