//! Event bus for store operations
//!
//! Services emit a [`StoreEvent`] after each successful write. The daemon
//! attaches a logging listener; other listeners (audit trails, metrics
//! exporters) subscribe the same way.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Events emitted by the services
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    // Reputation events
    NodeCreated {
        id: String,
    },
    StatsUpdated {
        id: String,
        audit_ratio: f64,
        uptime_ratio: f64,
    },
    BatchProcessed {
        succeeded: usize,
        failed: usize,
    },

    // Directory events
    DescriptorCached {
        id: String,
    },
    DirectoryRefreshed {
        written: usize,
    },

    // Irreparable segment events
    SegmentAttemptRecorded {
        segment: String,
        attempts: i64,
    },
    SegmentDeleted {
        segment: String,
        removed: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

/// Broadcast channel for store events
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StoreEvent) {
        trace!(event = ?event, "Emitting store event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes events to the trace log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::NodeCreated { id } => {
                debug!(node = %id, "Node created");
            }
            StoreEvent::BatchProcessed { succeeded, failed } => {
                debug!(succeeded, failed, "Update batch processed");
            }
            StoreEvent::DirectoryRefreshed { written } => {
                info!(written, "Directory refreshed");
            }
            StoreEvent::SegmentAttemptRecorded { segment, attempts } => {
                debug!(segment = %segment, attempts, "Repair attempt recorded");
            }
            StoreEvent::SegmentDeleted { segment, removed } => {
                debug!(segment = %segment, removed, "Segment deleted");
            }
            _ => {
                trace!(event = ?event, "Store event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
