use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Identifies one subscription on a [`DataChangedEvents`] hub.
pub type SubscriptionId = Uuid;

/// Notification that a layer has new content available.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChanged {
    /// Name of the layer that published the event.
    pub layer: String,
    /// Set when the change was caused by a failed fetch or render.
    pub error: Option<String>,
    /// Set when the change reports an aborted fetch.
    pub cancelled: bool,
}

impl DataChanged {
    pub fn new(layer: &str) -> Self {
        Self {
            layer: layer.to_string(),
            error: None,
            cancelled: false,
        }
    }
}

pub type DataChangedHandler = Arc<dyn Fn(&DataChanged) + Send + Sync>;

/// Subscriber registry for data-changed notifications.
///
/// Handlers are invoked synchronously on the publishing thread, after the
/// registry lock is released, so a handler may subscribe or unsubscribe.
#[derive(Default)]
pub struct DataChangedEvents {
    handlers: Mutex<HashMap<SubscriptionId, DataChangedHandler>>,
}

impl DataChangedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DataChanged) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(handler));
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn publish(&self, event: &DataChanged) {
        let handlers: Vec<DataChangedHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        log::trace!(
            "Publishing data change for '{}' to {} subscriber(s)",
            event.layer,
            handlers.len()
        );
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for DataChangedEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChangedEvents")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let hub = DataChangedEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            hub.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        hub.publish(&DataChanged::new("roads"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = DataChangedEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = hub.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.publish(&DataChanged::new("roads"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_can_reenter_hub() {
        let hub = Arc::new(DataChangedEvents::new());
        let inner = hub.clone();
        hub.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        hub.publish(&DataChanged::new("roads"));
        assert_eq!(hub.subscriber_count(), 2);
    }
}
