//! Stream Control Thread
//!
//! A `cpal::Stream` is `!Send` on several hosts, so each unit builds, plays,
//! pauses and drops its stream on one dedicated thread.
//!
//! ```text
//! Caller                         Stream Thread
//! ──────                         ─────────────
//! StreamThreadHandle             stream_thread_main
//!   │                              │ build stream (paused)
//!   │ ◄──────────── ready ──────── │
//!   ├── Start/Stop(reply) ──────►  │ play / pause
//!   │ ◄──────────── reply ──────── │
//!   └── Shutdown ───────────────►  │ drop stream, exit
//! ```
//!
//! # Real-Time Safety
//!
//! The data callbacks never allocate or log. They take the `gate` lock for
//! the duration of one period; `stop` takes the same lock after pausing, so
//! once it returns no callback is executing and none will do work.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SizedSample;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use aubridge_dsp::{PcmBuf, PcmBufMut, SampleFormat};

use super::device;
use crate::error::{CallbackError, PlatformError};
use crate::traits::{
    CaptureRender, Direction, ErrorCallback, HardwareFormat, InputCallback, RenderCallback,
    SliceRender,
};

/// Sample types the bridge exchanges with cpal
pub(crate) trait PcmSample: SizedSample + Send + 'static {
    fn wrap(data: &[Self]) -> PcmBuf<'_>;
    fn wrap_mut(data: &mut [Self]) -> PcmBufMut<'_>;
}

impl PcmSample for i16 {
    fn wrap(data: &[Self]) -> PcmBuf<'_> {
        PcmBuf::S16(data)
    }

    fn wrap_mut(data: &mut [Self]) -> PcmBufMut<'_> {
        PcmBufMut::S16(data)
    }
}

impl PcmSample for f32 {
    fn wrap(data: &[Self]) -> PcmBuf<'_> {
        PcmBuf::F32(data)
    }

    fn wrap_mut(data: &mut [Self]) -> PcmBufMut<'_> {
        PcmBufMut::F32(data)
    }
}

/// Data callback moved onto the stream thread
pub(crate) enum StreamCallback {
    Render(RenderCallback),
    Input(InputCallback),
}

/// Everything the thread needs to build its stream
pub(crate) struct StreamRequest {
    pub direction: Direction,
    pub device: Option<String>,
    pub format: HardwareFormat,
    pub callback: StreamCallback,
    pub on_error: Option<ErrorCallback>,
}

enum StreamCommand {
    Start(Sender<Result<(), PlatformError>>),
    Stop(Sender<Result<(), PlatformError>>),
    Shutdown,
}

/// Handle to the thread owning one cpal stream
pub(crate) struct StreamThreadHandle {
    command_tx: Sender<StreamCommand>,
    thread_handle: Option<JoinHandle<()>>,
    /// `true` while callbacks should do work; locked for each period
    gate: Arc<Mutex<bool>>,
}

impl StreamThreadHandle {
    /// Spawn the thread and wait until the stream is built (paused)
    pub fn spawn(request: StreamRequest) -> Result<Self, PlatformError> {
        let (command_tx, command_rx) = crossbeam_channel::bounded(8);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let gate = Arc::new(Mutex::new(false));
        let gate_clone = Arc::clone(&gate);
        let thread_name = format!("aubridge-{}", request.direction.name());

        let thread_handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || stream_thread_main(request, gate_clone, ready_tx, command_rx))
            .map_err(|e| PlatformError::Thread(format!("Failed to spawn stream thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| PlatformError::Thread("Stream thread exited during setup".into()))?;

        let mut handle = Self {
            command_tx,
            thread_handle: Some(thread_handle),
            gate,
        };

        if let Err(e) = ready {
            let _ = handle.shutdown();
            return Err(e);
        }

        Ok(handle)
    }

    fn request(
        &self,
        make: impl FnOnce(Sender<Result<(), PlatformError>>) -> StreamCommand,
    ) -> Result<(), PlatformError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.command_tx
            .send(make(reply_tx))
            .map_err(|e| PlatformError::Thread(format!("Failed to send command: {}", e)))?;
        reply_rx
            .recv()
            .map_err(|_| PlatformError::Thread("Stream thread did not reply".into()))?
    }

    pub fn start(&self) -> Result<(), PlatformError> {
        *self.gate.lock() = true;
        let result = self.request(StreamCommand::Start);
        if result.is_err() {
            *self.gate.lock() = false;
        }
        result
    }

    pub fn stop(&self) -> Result<(), PlatformError> {
        let result = self.request(StreamCommand::Stop);
        // Waits out a callback that is mid-period
        *self.gate.lock() = false;
        result
    }

    pub fn is_running(&self) -> bool {
        *self.gate.lock()
    }

    /// Drop the stream and join the thread
    pub fn shutdown(&mut self) -> Result<(), PlatformError> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        *self.gate.lock() = false;
        let _ = self.command_tx.send(StreamCommand::Shutdown);
        handle
            .join()
            .map_err(|_| PlatformError::Thread("Stream thread panicked".into()))?;

        debug!("Stream thread shutdown complete");
        Ok(())
    }
}

impl Drop for StreamThreadHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn stream_thread_main(
    request: StreamRequest,
    gate: Arc<Mutex<bool>>,
    ready_tx: Sender<Result<(), PlatformError>>,
    command_rx: Receiver<StreamCommand>,
) {
    let stream = match build_stream(request, gate) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Streams may start playing as soon as they are built
    if let Err(e) = stream.pause() {
        debug!("Initial pause not supported: {}", e);
    }
    let _ = ready_tx.send(Ok(()));

    for command in command_rx.iter() {
        match command {
            StreamCommand::Start(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| PlatformError::StreamStart(e.to_string()));
                let _ = reply.send(result);
            }
            StreamCommand::Stop(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| PlatformError::StreamStop(e.to_string()));
                let _ = reply.send(result);
            }
            StreamCommand::Shutdown => break,
        }
    }

    drop(stream);
    info!("Stream released");
}

fn build_stream(
    request: StreamRequest,
    gate: Arc<Mutex<bool>>,
) -> Result<cpal::Stream, PlatformError> {
    let StreamRequest {
        direction,
        device,
        format,
        callback,
        on_error,
    } = request;

    let device = device::find_device(direction, device.as_deref())?;
    let mut config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: match format.period_frames {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    };

    // The error callback is shared by both build attempts
    let on_error = Arc::new(Mutex::new(on_error));
    let callback = Arc::new(Mutex::new(Some(callback)));

    let first = build_for_format(&device, &config, &format, &callback, &gate, &on_error);
    match first {
        Ok(stream) => Ok(stream),
        Err(e) if matches!(config.buffer_size, cpal::BufferSize::Fixed(_)) => {
            warn!("Fixed buffer size rejected ({}), using host default", e);
            config.buffer_size = cpal::BufferSize::Default;
            build_for_format(&device, &config, &format, &callback, &gate, &on_error)
        }
        Err(e) => Err(e),
    }
}

type SharedCallback = Arc<Mutex<Option<StreamCallback>>>;
type SharedErrorCallback = Arc<Mutex<Option<ErrorCallback>>>;

fn build_for_format(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: &HardwareFormat,
    callback: &SharedCallback,
    gate: &Arc<Mutex<bool>>,
    on_error: &SharedErrorCallback,
) -> Result<cpal::Stream, PlatformError> {
    match format.sample_format {
        SampleFormat::S16 => build_typed::<i16>(device, config, callback, gate, on_error),
        SampleFormat::F32 => build_typed::<f32>(device, config, callback, gate, on_error),
    }
}

fn build_typed<T: PcmSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callback: &SharedCallback,
    gate: &Arc<Mutex<bool>>,
    on_error: &SharedErrorCallback,
) -> Result<cpal::Stream, PlatformError> {
    let err_sink = Arc::clone(on_error);
    let err_fn = move |err: cpal::StreamError| {
        warn!("Stream error: {}", err);
        if let Some(cb) = err_sink.lock().as_mut() {
            cb(PlatformError::Stream(err.to_string()));
        }
    };

    let gate = Arc::clone(gate);
    let channels = config.channels as usize;

    // Peek the direction without taking the callback out of the slot
    let is_render = matches!(callback.lock().as_ref(), Some(StreamCallback::Render(_)));
    let callback = Arc::clone(callback);

    let stream = if is_render {
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let active = gate.lock();
                render_period(data, *active, callback.lock().as_mut());
            },
            err_fn,
            None,
        )
    } else {
        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let active = gate.lock();
                if *active {
                    // Nothing to report to on this thread; the bridge logs
                    // its own failures
                    capture_period(data, channels, callback.lock().as_mut()).ok();
                }
            },
            err_fn,
            None,
        )
    };

    stream.map_err(|e| PlatformError::StreamBuild(e.to_string()))
}

/// Fill one output period; silence unless the gate is open and a render
/// callback is registered
///
/// The buffer is cleared first, so samples the callback leaves unwritten play
/// as silence rather than whatever the host left in it.
fn render_period<T: PcmSample>(
    data: &mut [T],
    active: bool,
    slot: Option<&mut StreamCallback>,
) {
    data.fill(T::EQUILIBRIUM);
    if let (true, Some(StreamCallback::Render(render))) = (active, slot) {
        if render(T::wrap_mut(data)).is_err() {
            data.fill(T::EQUILIBRIUM);
        }
    }
}

/// Hand one captured period to the input callback, returning its status
fn capture_period<T: PcmSample>(
    data: &[T],
    channels: usize,
    slot: Option<&mut StreamCallback>,
) -> Result<(), CallbackError> {
    match slot {
        Some(StreamCallback::Input(input)) => {
            let mut render = SliceRender::new(T::wrap(data), channels);
            let frames = render.frames();
            input(&mut render, frames)
        }
        _ => Ok(()),
    }
}
