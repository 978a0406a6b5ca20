//! Session Interruptions
//!
//! The OS audio session can be interrupted (incoming call, another app taking
//! exclusive audio, device sleep). The session layer reports begin/end
//! notifications out-of-band; the coordinator fans them out to every bridge
//! that subscribed. Bridges react by stopping and restarting their hardware
//! unit, leaving handlers and buffers alone.
//!
//! ```text
//! session layer ──begin/end──▶ InterruptionCoordinator ──▶ listener (per bridge)
//!                                                          └─ unit.stop() / unit.start()
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Session notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interruption {
    Began,
    Ended,
}

/// Per-bridge reaction to an interruption
pub type InterruptionListener = Arc<dyn Fn(Interruption) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, InterruptionListener)>,
}

/// Cloneable handle to the process audio session
#[derive(Clone, Default)]
pub struct InterruptionCoordinator {
    registry: Arc<Mutex<Registry>>,
}

impl InterruptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; it stays registered until the handle is dropped
    pub fn subscribe(&self, listener: InterruptionListener) -> SessionHandle {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        debug!("Session listener {} subscribed", id);

        SessionHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn begin_interruption(&self) {
        info!("Audio session interruption began");
        self.notify(Interruption::Began);
    }

    pub fn end_interruption(&self) {
        info!("Audio session interruption ended");
        self.notify(Interruption::Ended);
    }

    pub fn notify(&self, event: Interruption) {
        // Listeners run unlocked so one may drop its own subscription
        let listeners: Vec<InterruptionListener> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

/// Subscription to an [`InterruptionCoordinator`]; unsubscribes on drop
pub struct SessionHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.retain(|(id, _)| *id != self.id);
            debug!("Session listener {} released", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener() -> (InterruptionListener, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let began = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicUsize::new(0));
        let (b, e) = (Arc::clone(&began), Arc::clone(&ended));
        let listener: InterruptionListener = Arc::new(move |event: Interruption| match event {
            Interruption::Began => {
                b.fetch_add(1, Ordering::SeqCst);
            }
            Interruption::Ended => {
                e.fetch_add(1, Ordering::SeqCst);
            }
        });
        (listener, began, ended)
    }

    #[test]
    fn test_broadcast_to_subscribers() {
        let coordinator = InterruptionCoordinator::new();
        let (l1, began1, ended1) = counting_listener();
        let (l2, began2, _) = counting_listener();
        let _h1 = coordinator.subscribe(l1);
        let _h2 = coordinator.subscribe(l2);

        coordinator.begin_interruption();
        coordinator.end_interruption();

        assert_eq!(began1.load(Ordering::SeqCst), 1);
        assert_eq!(ended1.load(Ordering::SeqCst), 1);
        assert_eq!(began2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let coordinator = InterruptionCoordinator::new();
        let (listener, began, _) = counting_listener();
        let handle = coordinator.subscribe(listener);
        assert_eq!(coordinator.subscriber_count(), 1);

        drop(handle);
        assert_eq!(coordinator.subscriber_count(), 0);

        coordinator.begin_interruption();
        assert_eq!(began.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_outliving_coordinator() {
        let coordinator = InterruptionCoordinator::new();
        let (listener, _, _) = counting_listener();
        let handle = coordinator.subscribe(listener);
        drop(coordinator);
        drop(handle);
    }

    #[test]
    fn test_clones_share_registry() {
        let coordinator = InterruptionCoordinator::new();
        let clone = coordinator.clone();
        let (listener, _, ended) = counting_listener();
        let _handle = clone.subscribe(listener);

        coordinator.end_interruption();
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }
}
