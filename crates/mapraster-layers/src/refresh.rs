//! Forwarding layer updates to the host view.
//!
//! Data-changed notifications arrive on whatever thread finished the work,
//! including the debounce timer. The host view they target may already be
//! torn down by then; such refresh failures are logged and dropped here so
//! they never reach the timer or the publisher.

use std::sync::{Arc, Weak};

use thiserror::Error;

use mapraster_core::{Layer, SubscriptionId};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Host view has been disposed")]
    Disposed,

    #[error("Host refresh failed: {0}")]
    Other(String),
}

/// The view that draws the map.
pub trait GraphicsHost: Send + Sync {
    /// Request a redraw.
    fn refresh_graphics(&self) -> Result<(), HostError>;
}

/// Ask `host` to redraw, logging instead of propagating failures.
///
/// Returns `true` if the host accepted the request.
pub fn refresh_graphics(host: &dyn GraphicsHost) -> bool {
    match host.refresh_graphics() {
        Ok(()) => true,
        Err(HostError::Disposed) => {
            // The host is being torn down; a live host gets another notification.
            log::warn!("Refresh requested on a disposed host view; ignoring");
            false
        }
        Err(e) => {
            log::error!("{}", e);
            false
        }
    }
}

/// Subscription that refreshes a host whenever a layer publishes new data.
///
/// Holds the host weakly: once the host is dropped, notifications are ignored.
/// Unsubscribes on drop.
pub struct RefreshBinding {
    layer: Arc<dyn Layer>,
    subscription: SubscriptionId,
}

impl RefreshBinding {
    pub fn bind(layer: Arc<dyn Layer>, host: &Arc<dyn GraphicsHost>) -> Self {
        let host: Weak<dyn GraphicsHost> = Arc::downgrade(host);
        let subscription = layer.data_changed().subscribe(move |event| {
            match host.upgrade() {
                Some(host) => {
                    refresh_graphics(host.as_ref());
                }
                None => log::trace!("Host gone; dropping update from '{}'", event.layer),
            }
        });
        Self {
            layer,
            subscription,
        }
    }
}

impl Drop for RefreshBinding {
    fn drop(&mut self) {
        self.layer.data_changed().unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use mapraster_core::{DataChanged, MemoryLayer};

    #[derive(Default)]
    struct FakeHost {
        refreshes: AtomicUsize,
        disposed: AtomicBool,
    }

    impl GraphicsHost for FakeHost {
        fn refresh_graphics(&self) -> Result<(), HostError> {
            if self.disposed.load(Ordering::SeqCst) {
                return Err(HostError::Disposed);
            }
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenHost;

    impl GraphicsHost for BrokenHost {
        fn refresh_graphics(&self) -> Result<(), HostError> {
            Err(HostError::Other("surface lost".to_string()))
        }
    }

    #[test]
    fn test_refresh_swallows_errors() {
        let host = FakeHost::default();
        assert!(refresh_graphics(&host));
        host.disposed.store(true, Ordering::SeqCst);
        assert!(!refresh_graphics(&host));
        assert!(!refresh_graphics(&BrokenHost));
        assert_eq!(host.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_binding_refreshes_on_data_change() {
        let layer = Arc::new(MemoryLayer::new("roads"));
        let fake = Arc::new(FakeHost::default());
        let host: Arc<dyn GraphicsHost> = fake.clone();
        let binding = RefreshBinding::bind(layer.clone(), &host);

        layer.data_changed().publish(&DataChanged::new("roads"));
        layer.data_changed().publish(&DataChanged::new("roads"));
        assert_eq!(fake.refreshes.load(Ordering::SeqCst), 2);

        fake.disposed.store(true, Ordering::SeqCst);
        layer.data_changed().publish(&DataChanged::new("roads"));
        assert_eq!(fake.refreshes.load(Ordering::SeqCst), 2);

        drop(binding);
        assert_eq!(layer.data_changed().subscriber_count(), 0);
    }

    #[test]
    fn test_binding_ignores_dropped_host() {
        let layer = Arc::new(MemoryLayer::new("roads"));
        let host: Arc<dyn GraphicsHost> = Arc::new(FakeHost::default());
        let _binding = RefreshBinding::bind(layer.clone(), &host);
        drop(host);
        layer.data_changed().publish(&DataChanged::new("roads"));
    }
}
