//! Hardware Unit Lifecycle
//!
//! Owns a bridge's hardware unit and serializes the three callers of its
//! start/stop primitives: construction, session interruptions and teardown.
//! The real-time callback never touches this lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aubridge_platform::{Direction, HardwareUnit};

use crate::error::BridgeResult;
use crate::interruption::{Interruption, InterruptionListener};

/// Observable bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeState {
    /// Parameters validated, unit instantiated
    Created,
    /// Format negotiated, callback registered, converter built
    Initialized,
    /// Hardware is invoking the callback
    Running,
    /// Hardware stopped by a session interruption; all state kept
    Interrupted,
    /// Torn down; the unit is gone
    Stopped,
}

struct Inner {
    state: BridgeState,
    unit: Option<Box<dyn HardwareUnit>>,
}

pub(crate) struct UnitLifecycle {
    direction: Direction,
    inner: Mutex<Inner>,
    /// Asks the callback to drop converter history before its next period
    resync: Arc<AtomicBool>,
}

impl UnitLifecycle {
    /// Take over an initialized unit
    pub fn new(
        direction: Direction,
        unit: Box<dyn HardwareUnit>,
        resync: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            direction,
            inner: Mutex::new(Inner {
                state: BridgeState::Initialized,
                unit: Some(unit),
            }),
            resync,
        })
    }

    pub fn state(&self) -> BridgeState {
        self.inner.lock().state
    }

    pub fn start(&self) -> BridgeResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(unit) = inner.unit.as_ref() {
            unit.start()?;
            inner.state = BridgeState::Running;
            debug!("{}: running", self.direction.name());
        }
        Ok(())
    }

    /// Listener for the session coordinator; does nothing once torn down
    pub fn listener(self: &Arc<Self>) -> InterruptionListener {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |event: Interruption| {
            if let Some(lifecycle) = weak.upgrade() {
                lifecycle.interrupt(event);
            }
        })
    }

    pub fn interrupt(&self, event: Interruption) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(unit) = inner.unit.as_ref() else {
            debug!("{}: interruption after teardown ignored", self.direction.name());
            return;
        };

        match event {
            Interruption::Began => {
                if let Err(e) = unit.stop() {
                    warn!("{}: stop on interruption failed: {}", self.direction.name(), e);
                }
                inner.state = BridgeState::Interrupted;
            }
            Interruption::Ended if inner.state != BridgeState::Interrupted => {
                debug!(
                    "{}: interruption end while {:?} ignored",
                    self.direction.name(),
                    inner.state
                );
                return;
            }
            Interruption::Ended => match unit.start() {
                Ok(()) => {
                    self.resync.store(true, Ordering::Release);
                    inner.state = BridgeState::Running;
                }
                Err(e) => {
                    warn!(
                        "{}: restart after interruption failed: {}",
                        self.direction.name(),
                        e
                    );
                }
            },
        }
        debug!("{}: {:?}", self.direction.name(), inner.state);
    }

    /// Stop hardware callbacks, uninitialize (releases the callback and its
    /// converter), then release the unit
    pub fn shutdown(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(unit) = inner.unit.take() else {
            return false;
        };
        inner.state = BridgeState::Stopped;

        if let Err(e) = unit.stop() {
            warn!("{}: stop failed: {}", self.direction.name(), e);
        }
        if let Err(e) = unit.uninitialize() {
            warn!("{}: uninitialize failed: {}", self.direction.name(), e);
        }
        drop(unit);
        true
    }
}
