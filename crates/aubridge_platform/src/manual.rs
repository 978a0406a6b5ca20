//! Manually Driven Hardware Backend
//!
//! A [`HardwareComponent`] whose units never touch real audio hardware. The
//! caller plays the role of the OS audio thread: it fires render and capture
//! callbacks on demand through a [`ManualUnitHandle`]. Every lifecycle call is
//! recorded in a shared journal so teardown ordering can be asserted.
//!
//! Failures (format rejection, start failure, render failure) can be injected
//! to exercise construction and transient-error paths.

use std::sync::Arc;

use parking_lot::Mutex;

use aubridge_dsp::{PcmBuf, PcmBufMut};

use crate::error::{CallbackError, PlatformError};
use crate::traits::{
    CaptureRender, Direction, ErrorCallback, HardwareComponent, HardwareFormat, HardwareUnit,
    InputCallback, RenderCallback,
};

/// Lifecycle call recorded by a manual unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEvent {
    Instantiated(Direction),
    FormatSet(Direction),
    CallbackRegistered(Direction),
    Initialized(Direction),
    Started(Direction),
    Stopped(Direction),
    Uninitialized(Direction),
    /// Registered callbacks (and everything they own) were dropped
    CallbackReleased(Direction),
    /// The unit itself was dropped
    Disposed(Direction),
}

/// Failure to inject into the next matching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Instantiate,
    RejectFormat,
    Initialize,
    Start,
}

type Journal = Arc<Mutex<Vec<UnitEvent>>>;

/// Hardware component driven by hand
pub struct ManualComponent {
    input_rate: u32,
    output_rate: u32,
    journal: Journal,
    failures: Mutex<Vec<Failure>>,
    units: Mutex<Vec<ManualUnitHandle>>,
}

impl ManualComponent {
    /// Component whose default input/output devices run at the given rates
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
            journal: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(Vec::new()),
            units: Mutex::new(Vec::new()),
        }
    }

    /// Make the next operation of this kind fail (one-shot)
    pub fn inject(&self, failure: Failure) {
        self.failures.lock().push(failure);
    }

    /// Snapshot of every lifecycle call so far, across all units
    pub fn journal(&self) -> Vec<UnitEvent> {
        self.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    /// Handle to the most recently instantiated unit of `direction`
    pub fn last_unit(&self, direction: Direction) -> Option<ManualUnitHandle> {
        self.units
            .lock()
            .iter()
            .rev()
            .find(|u| u.shared.direction == direction)
            .cloned()
    }

    fn take_failure(&self, failure: Failure) -> bool {
        take_failure(&self.failures, failure)
    }
}

fn take_failure(failures: &Mutex<Vec<Failure>>, failure: Failure) -> bool {
    let mut failures = failures.lock();
    match failures.iter().position(|f| *f == failure) {
        Some(pos) => {
            failures.remove(pos);
            true
        }
        None => false,
    }
}

impl HardwareComponent for ManualComponent {
    fn name(&self) -> &str {
        "manual"
    }

    fn instantiate(
        &self,
        direction: Direction,
        device: Option<&str>,
    ) -> Result<Box<dyn HardwareUnit>, PlatformError> {
        if self.take_failure(Failure::Instantiate) {
            return Err(PlatformError::DeviceNotFound(
                device.unwrap_or("default").to_string(),
            ));
        }

        let hardware_rate = match direction {
            Direction::Output => self.output_rate,
            Direction::Input => self.input_rate,
        };

        let pending: Vec<Failure> = self.failures.lock().drain(..).collect();
        let shared = Arc::new(ManualShared {
            direction,
            hardware_rate,
            journal: Arc::clone(&self.journal),
            failures: Mutex::new(pending),
            state: Mutex::new(ManualState::default()),
            callbacks: Mutex::new(Callbacks::default()),
        });
        shared.record(UnitEvent::Instantiated(direction));

        self.units.lock().push(ManualUnitHandle {
            shared: Arc::clone(&shared),
        });

        Ok(Box::new(ManualUnit { shared }))
    }

    fn default_input_sample_rate(&self) -> Result<u32, PlatformError> {
        Ok(self.input_rate)
    }

    fn default_output_sample_rate(&self) -> Result<u32, PlatformError> {
        Ok(self.output_rate)
    }
}

#[derive(Default)]
struct ManualState {
    format: Option<HardwareFormat>,
    initialized: bool,
    running: bool,
    render_on_stop: bool,
}

#[derive(Default)]
struct Callbacks {
    render: Option<RenderCallback>,
    input: Option<InputCallback>,
    error: Option<ErrorCallback>,
}

impl Callbacks {
    fn is_empty(&self) -> bool {
        self.render.is_none() && self.input.is_none() && self.error.is_none()
    }
}

struct ManualShared {
    direction: Direction,
    hardware_rate: u32,
    journal: Journal,
    failures: Mutex<Vec<Failure>>,
    state: Mutex<ManualState>,
    /// Held for the whole duration of a fired callback, like a hardware
    /// thread that `stop()` has to wait for
    callbacks: Mutex<Callbacks>,
}

impl ManualShared {
    fn record(&self, event: UnitEvent) {
        self.journal.lock().push(event);
    }

    fn fire_render_locked(
        callbacks: &mut Callbacks,
        buf: PcmBufMut<'_>,
    ) -> Result<(), CallbackError> {
        match callbacks.render.as_mut() {
            Some(cb) => cb(buf),
            None => Err(CallbackError::NotRunning),
        }
    }
}

/// Unit returned by [`ManualComponent::instantiate`]
pub struct ManualUnit {
    shared: Arc<ManualShared>,
}

impl HardwareUnit for ManualUnit {
    fn direction(&self) -> Direction {
        self.shared.direction
    }

    fn set_stream_format(&self, format: HardwareFormat) -> Result<(), PlatformError> {
        if take_failure(&self.shared.failures, Failure::RejectFormat) {
            return Err(PlatformError::FormatRejected(format!(
                "{} Hz, {} ch, {}",
                format.sample_rate, format.channels, format.sample_format
            )));
        }
        let mut state = self.shared.state.lock();
        if state.initialized {
            return Err(PlatformError::AlreadyInitialized);
        }
        state.format = Some(format);
        self.shared.record(UnitEvent::FormatSet(self.shared.direction));
        Ok(())
    }

    fn stream_format(&self) -> Option<HardwareFormat> {
        self.shared.state.lock().format
    }

    fn set_render_callback(&self, callback: RenderCallback) -> Result<(), PlatformError> {
        if self.shared.direction != Direction::Output {
            return Err(PlatformError::WrongDirection("input"));
        }
        self.shared.callbacks.lock().render = Some(callback);
        self.shared
            .record(UnitEvent::CallbackRegistered(self.shared.direction));
        Ok(())
    }

    fn set_input_callback(&self, callback: InputCallback) -> Result<(), PlatformError> {
        if self.shared.direction != Direction::Input {
            return Err(PlatformError::WrongDirection("output"));
        }
        self.shared.callbacks.lock().input = Some(callback);
        self.shared
            .record(UnitEvent::CallbackRegistered(self.shared.direction));
        Ok(())
    }

    fn set_error_callback(&self, callback: ErrorCallback) -> Result<(), PlatformError> {
        self.shared.callbacks.lock().error = Some(callback);
        Ok(())
    }

    fn initialize(&self) -> Result<(), PlatformError> {
        if take_failure(&self.shared.failures, Failure::Initialize) {
            return Err(PlatformError::StreamBuild("injected failure".into()));
        }
        let mut state = self.shared.state.lock();
        if state.format.is_none() {
            return Err(PlatformError::FormatNotSet);
        }
        state.initialized = true;
        self.shared.record(UnitEvent::Initialized(self.shared.direction));
        Ok(())
    }

    fn start(&self) -> Result<(), PlatformError> {
        if take_failure(&self.shared.failures, Failure::Start) {
            return Err(PlatformError::StreamStart("injected failure".into()));
        }
        let mut state = self.shared.state.lock();
        if !state.initialized {
            return Err(PlatformError::NotInitialized);
        }
        state.running = true;
        self.shared.record(UnitEvent::Started(self.shared.direction));
        Ok(())
    }

    fn stop(&self) -> Result<(), PlatformError> {
        let render_on_stop = {
            let state = self.shared.state.lock();
            if !state.initialized {
                return Err(PlatformError::NotInitialized);
            }
            state.running && state.render_on_stop
        };

        // Waits for any in-flight callback, optionally racing one last render
        // against the stop like a hardware period that was already due.
        let mut callbacks = self.shared.callbacks.lock();
        if render_on_stop && self.shared.direction == Direction::Output {
            let mut scratch = [0.0_f32; 64];
            let _ = ManualShared::fire_render_locked(
                &mut callbacks,
                PcmBufMut::F32(&mut scratch),
            );
        }
        self.shared.state.lock().running = false;
        drop(callbacks);

        self.shared.record(UnitEvent::Stopped(self.shared.direction));
        Ok(())
    }

    fn uninitialize(&self) -> Result<(), PlatformError> {
        {
            let mut state = self.shared.state.lock();
            if !state.initialized {
                return Ok(());
            }
            state.initialized = false;
            state.running = false;
        }
        self.shared
            .record(UnitEvent::Uninitialized(self.shared.direction));

        let released = std::mem::take(&mut *self.shared.callbacks.lock());
        if !released.is_empty() {
            drop(released);
            self.shared
                .record(UnitEvent::CallbackReleased(self.shared.direction));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    fn hardware_sample_rate(&self) -> Result<u32, PlatformError> {
        Ok(self.shared.hardware_rate)
    }
}

impl Drop for ManualUnit {
    fn drop(&mut self) {
        let _ = self.uninitialize();
        // Callbacks registered but never initialized are released here
        let leftover = std::mem::take(&mut *self.shared.callbacks.lock());
        if !leftover.is_empty() {
            drop(leftover);
            self.shared
                .record(UnitEvent::CallbackReleased(self.shared.direction));
        }
        self.shared.record(UnitEvent::Disposed(self.shared.direction));
    }
}

/// Result of one fired capture period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    /// Samples the callback pulled out of the hardware buffer
    pub drained_samples: usize,
    /// What the input callback returned
    pub status: Result<(), CallbackError>,
}

/// Test-side handle that plays the OS audio thread for one manual unit
#[derive(Clone)]
pub struct ManualUnitHandle {
    shared: Arc<ManualShared>,
}

impl ManualUnitHandle {
    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    pub fn format(&self) -> Option<HardwareFormat> {
        self.shared.state.lock().format
    }

    /// Fire one render callback on the current thread
    ///
    /// Fails with [`CallbackError::NotRunning`] when the unit is stopped,
    /// exactly like hardware that simply stops calling.
    pub fn fire_render(&self, buf: PcmBufMut<'_>) -> Result<(), CallbackError> {
        let mut callbacks = self.shared.callbacks.lock();
        if !self.is_running() {
            return Err(CallbackError::NotRunning);
        }
        ManualShared::fire_render_locked(&mut callbacks, buf)
    }

    /// Fire one capture completion delivering `captured`
    pub fn fire_capture(&self, captured: PcmBuf<'_>) -> Result<CaptureReport, CallbackError> {
        self.fire_capture_inner(captured, None)
    }

    /// Fire a capture completion whose hardware render fails with `status`
    pub fn fire_failed_capture(
        &self,
        captured: PcmBuf<'_>,
        status: i32,
    ) -> Result<CaptureReport, CallbackError> {
        self.fire_capture_inner(captured, Some(status))
    }

    fn fire_capture_inner(
        &self,
        captured: PcmBuf<'_>,
        fail_with: Option<i32>,
    ) -> Result<CaptureReport, CallbackError> {
        let mut callbacks = self.shared.callbacks.lock();
        if !self.is_running() {
            return Err(CallbackError::NotRunning);
        }
        let channels = self
            .format()
            .map(|f| f.channels as usize)
            .unwrap_or(1)
            .max(1);
        let cb = callbacks.input.as_mut().ok_or(CallbackError::NotRunning)?;

        let mut render = CountingRender {
            data: captured,
            channels,
            fail_with,
            drained: 0,
        };
        let frames = render.frames();
        let status = cb(&mut render, frames);
        Ok(CaptureReport {
            drained_samples: render.drained,
            status,
        })
    }

    /// Report an asynchronous stream error through the error callback
    pub fn raise_error(&self, error: PlatformError) -> bool {
        let mut callbacks = self.shared.callbacks.lock();
        match callbacks.error.as_mut() {
            Some(cb) => {
                cb(error);
                true
            }
            None => false,
        }
    }

    /// Fire one last render from inside `stop()` (simulates an in-flight period)
    pub fn set_render_on_stop(&self, enabled: bool) {
        self.shared.state.lock().render_on_stop = enabled;
    }
}

struct CountingRender<'a> {
    data: PcmBuf<'a>,
    channels: usize,
    fail_with: Option<i32>,
    drained: usize,
}

impl CaptureRender for CountingRender<'_> {
    fn frames(&self) -> usize {
        self.data.frames(self.channels)
    }

    fn render(&mut self, mut dst: PcmBufMut<'_>) -> Result<usize, CallbackError> {
        if let Some(status) = self.fail_with {
            return Err(CallbackError::Render(status));
        }
        let n = dst
            .copy_from(self.data)
            .map_err(|_| CallbackError::FormatMismatch)?;
        self.drained += n;
        Ok(n)
    }
}
