//! Event bus - broadcast of pool events
//!
//! Fan-out goes two ways: registered `EventListener`s are invoked inline on
//! publish, and channel consumers receive a copy through a broadcast channel.

use super::types::{EventCategory, EventSeverity, PoolEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

// ============================================================================
// EventListener
// ============================================================================

/// Listener registration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Implemented by components that want pool events delivered to them
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Listener name (for debugging)
    fn name(&self) -> &str;

    /// Categories of interest (None means all events)
    fn categories(&self) -> Option<Vec<EventCategory>> {
        None
    }

    /// Handle one event
    async fn on_event(&self, event: &PoolEvent);
}

// ============================================================================
// EventFilter
// ============================================================================

/// Event filter for listener registrations
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Category filter
    pub categories: Option<Vec<EventCategory>>,

    /// Event type patterns (prefix match)
    pub event_types: Option<Vec<String>>,

    /// Minimum severity
    pub min_severity: Option<EventSeverity>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_event_types(mut self, types: Vec<String>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Check whether an event passes the filter
    pub fn matches(&self, event: &PoolEvent) -> bool {
        if let Some(ref cats) = self.categories {
            if !cats.contains(&event.category) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| event.event_type.starts_with(t.as_str())) {
                return false;
            }
        }

        if let Some(min_sev) = self.min_severity {
            if event.severity < min_sev {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broadcast channel capacity
    pub channel_capacity: usize,

    /// Number of events kept in the in-memory history
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_size: 100,
        }
    }
}

struct RegisteredListener {
    listener: Arc<dyn EventListener>,
    filter: Option<EventFilter>,
}

/// Broadcasts pool events to listeners and channel subscribers
pub struct EventBus {
    config: EventBusConfig,

    /// Broadcast channel sender
    sender: broadcast::Sender<PoolEvent>,

    /// Registered listeners
    listeners: RwLock<HashMap<ListenerId, RegisteredListener>>,

    /// Listener id counter
    listener_counter: AtomicU64,

    /// Recent event history
    history: RwLock<Vec<PoolEvent>>,

    /// Total published events
    event_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);

        Self {
            config,
            sender,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            history: RwLock::new(Vec::new()),
            event_count: AtomicU64::new(0),
        }
    }

    /// Register a listener for all events
    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.subscribe_with_filter(listener, None).await
    }

    /// Register a listener with a filter
    pub async fn subscribe_with_filter(
        &self,
        listener: Arc<dyn EventListener>,
        filter: Option<EventFilter>,
    ) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        let mut listeners = self.listeners.write().await;
        listeners.insert(id, RegisteredListener { listener, filter });

        id
    }

    /// Remove a listener
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let removed = listeners.remove(&id).is_some();

        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }

        removed
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: PoolEvent) {
        self.event_count.fetch_add(1, Ordering::SeqCst);

        {
            let mut history = self.history.write().await;
            history.push(event.clone());

            if history.len() > self.config.history_size {
                history.remove(0);
            }
        }

        // Channel subscribers; a send error only means nobody is listening
        let _ = self.sender.send(event.clone());

        let listeners = self.listeners.read().await;
        for (id, registered) in listeners.iter() {
            let should_deliver = match &registered.filter {
                Some(filter) => filter.matches(&event),
                None => match registered.listener.categories() {
                    Some(cats) => cats.contains(&event.category),
                    None => true,
                },
            };

            if should_deliver {
                trace!(
                    listener_id = %id,
                    listener_name = registered.listener.name(),
                    event_type = %event.event_type,
                    "Delivering event to listener"
                );

                registered.listener.on_event(&event).await;
            }
        }
    }

    /// Create a broadcast receiver (stream style consumption)
    pub fn receiver(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    /// Most recent events, newest first
    pub async fn history(&self, limit: Option<usize>) -> Vec<PoolEvent> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Number of registered listeners
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Total published events
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
