// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-process broadcast of training and cortex events over a tokio
// broadcast channel. The CLI subscribes to render progress; tests subscribe
// to assert on it. Nothing is persisted: the training report is the durable
// record of a run.

use crate::domain::events::TrainingEvent;
use async_trait::async_trait;
use praxis_cortex::CortexEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Training(TrainingEvent),
    Cortex(CortexEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Slow subscribers lose the oldest events once `capacity` are buffered
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a training loop event
    pub fn publish_training_event(&self, event: TrainingEvent) {
        metrics::counter!("praxis_training_events_total", "type" => event.event_type()).increment(1);
        self.broadcast(DomainEvent::Training(event));
    }

    /// Publish a cortex (library / knowledge base) event
    pub fn publish_cortex_event(&self, event: CortexEvent) {
        self.broadcast(DomainEvent::Cortex(event));
    }

    fn broadcast(&self, event: DomainEvent) {
        debug!(?event, "Publishing event");
        // send() fails only when nobody is subscribed
        let _ = self.sender.send(event);
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to training events only
    pub fn subscribe_training(&self) -> TrainingEventReceiver {
        TrainingEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// The cortex services publish through the same bus
#[async_trait]
impl praxis_cortex::application::EventBus for EventBus {
    async fn publish(&self, event: CortexEvent) -> anyhow::Result<()> {
        self.publish_cortex_event(event);
        Ok(())
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver that skips everything but training events
pub struct TrainingEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl TrainingEventReceiver {
    pub async fn recv(&mut self) -> Result<TrainingEvent, EventBusError> {
        loop {
            if let DomainEvent::Training(event) = self.receiver.recv().await.map_err(map_recv_error)? {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
