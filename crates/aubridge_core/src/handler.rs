//! Application Handlers
//!
//! A handler is the application's side of a bridge: it fills (playback) or
//! consumes (capture) application-format samples. Handlers capture their own
//! context, so there is no separate user pointer.
//!
//! The [`HandlerSlot`] is the only state the control thread mutates while the
//! hardware thread is running. The hardware thread takes the lock just long
//! enough to clone the `Arc`, then calls the handler unlocked.

use std::sync::Arc;

use parking_lot::Mutex;

use aubridge_dsp::{PcmBuf, PcmBufMut};
use aubridge_platform::PlatformError;

pub type WriteFn = dyn Fn(PcmBufMut<'_>) + Send + Sync;
pub type ReadFn = dyn Fn(PcmBuf<'_>, usize) + Send + Sync;

/// Fills the given buffer completely with application-format samples
///
/// The buffer length is exactly the sample count the converter asked for.
pub type WriteHandler = Arc<WriteFn>;

/// Receives one converted period and its frame count
pub type ReadHandler = Arc<ReadFn>;

/// Receives asynchronous capture stream errors (device lost, backend failure)
pub type CaptureErrorHandler = Arc<dyn Fn(&PlatformError) + Send + Sync>;

/// Mutex-guarded, clearable handler reference
pub struct HandlerSlot<H: ?Sized> {
    inner: Mutex<Option<Arc<H>>>,
}

impl<H: ?Sized> HandlerSlot<H> {
    pub fn new(handler: Option<Arc<H>>) -> Self {
        Self {
            inner: Mutex::new(handler),
        }
    }

    /// Current handler, if any (read-copy-use)
    pub fn snapshot(&self) -> Option<Arc<H>> {
        self.inner.lock().clone()
    }

    pub fn set(&self, handler: Arc<H>) {
        *self.inner.lock() = Some(handler);
    }

    /// Empty the slot; callbacks already holding a snapshot finish their period
    pub fn clear(&self) -> Option<Arc<H>> {
        self.inner.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }
}
