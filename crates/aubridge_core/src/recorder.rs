//! Capture Bridge
//!
//! Appends each captured hardware completion to a staging FIFO, converts it to
//! the application rate and hands whole application periods to a
//! [`ReadHandler`]. Completions need not line up with periods: frames left
//! over after the last whole period wait for the next completion.
//!
//! ```text
//! hardware completion(N frames @ hw rate)
//!   ├─ render N frames → staging tail
//!   └─ while staging holds enough for one period:
//!        FormatConverter::convert(period @ app rate)
//!          └─ producer: copies from staging front
//!        read handler(period, frames)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use aubridge_dsp::{FormatConverter, PcmBufMut, PcmVec};
use aubridge_platform::{
    CallbackError, CaptureRender, Direction, ErrorCallback, HardwareFormat, InputCallback,
    PlatformError,
};

use crate::config::StreamParameters;
use crate::driver::AudioDriver;
use crate::error::{BridgeError, BridgeResult};
use crate::handler::{CaptureErrorHandler, HandlerSlot, ReadFn, ReadHandler};
use crate::interruption::SessionHandle;
use crate::lifecycle::{BridgeState, UnitLifecycle};

/// Input stream bridging an input unit to a read handler
pub struct CaptureBridge {
    params: StreamParameters,
    hardware_rate: u32,
    handler: Arc<HandlerSlot<ReadFn>>,
    lifecycle: Arc<UnitLifecycle>,
    session: Option<SessionHandle>,
}

impl CaptureBridge {
    /// Negotiate an input unit at its native rate and start it
    ///
    /// `on_error` receives asynchronous stream errors reported by the
    /// hardware layer. Nothing is left running if this fails.
    pub fn new(
        driver: &AudioDriver,
        params: &StreamParameters,
        device: Option<&str>,
        handler: ReadHandler,
        on_error: Option<CaptureErrorHandler>,
    ) -> BridgeResult<Self> {
        Self::build(driver, params, device, handler, on_error).inspect_err(|e| {
            error!("capture: alloc failed: {}", e);
        })
    }

    fn build(
        driver: &AudioDriver,
        params: &StreamParameters,
        device: Option<&str>,
        handler: ReadHandler,
        on_error: Option<CaptureErrorHandler>,
    ) -> BridgeResult<Self> {
        params.validate().map_err(BridgeError::InvalidArgument)?;
        let config = driver.config();
        config.validate().map_err(BridgeError::InvalidArgument)?;

        let component = driver.component();
        let unit = component.instantiate(Direction::Input, device)?;

        let hardware_rate = match unit.hardware_sample_rate() {
            Ok(rate) => rate,
            Err(e) => {
                warn!("capture: unit rate query failed ({}), using default input", e);
                component.default_input_sample_rate()?
            }
        };
        info!("capture: hardware srate {} Hz", hardware_rate);

        let channels = params.channels as usize;
        let hardware_period = params.period_frames_at(hardware_rate).max(1);
        let app_format = params.stream_format();

        let converter = FormatConverter::new(
            app_format.with_rate(hardware_rate),
            app_format,
            params.period_frames(),
            &config.converter,
        )?;

        unit.set_stream_format(HardwareFormat {
            sample_rate: hardware_rate,
            channels: params.channels,
            sample_format: params.format,
            period_frames: Some(hardware_period as u32),
        })?;

        let slot = Arc::new(HandlerSlot::new(Some(handler)));
        let resync = Arc::new(AtomicBool::new(false));
        let staged_frames =
            converter.max_source_frames() + hardware_period * config.period_headroom;
        let capture = CaptureState::new(
            converter,
            PcmVec::zeroed(params.format, staged_frames * channels),
            PcmVec::zeroed(params.format, params.period_samples()),
            channels,
            hardware_period,
        );
        unit.set_input_callback(input_callback(
            capture,
            Arc::clone(&slot),
            Arc::clone(&resync),
        ))?;
        unit.set_error_callback(error_callback(on_error))?;
        unit.initialize()?;

        let lifecycle = UnitLifecycle::new(Direction::Input, unit, resync);
        let session = driver.coordinator().subscribe(lifecycle.listener());
        if let Err(e) = lifecycle.start() {
            // Release the unit while the session is still held
            lifecycle.shutdown();
            drop(session);
            return Err(e);
        }

        info!(
            "capture: {} Hz → {} Hz, {} ch, {}, {} ms",
            hardware_rate, params.sample_rate, params.channels, params.format, params.ptime_ms
        );

        Ok(Self {
            params: *params,
            hardware_rate,
            handler: slot,
            lifecycle,
            session: Some(session),
        })
    }

    pub fn params(&self) -> &StreamParameters {
        &self.params
    }

    /// Native rate the input unit was opened at
    pub fn hardware_rate(&self) -> u32 {
        self.hardware_rate
    }

    pub fn state(&self) -> BridgeState {
        self.lifecycle.state()
    }

    /// Detach the application; later periods are drained and dropped
    pub fn clear_handler(&self) {
        self.handler.clear();
    }

    pub fn set_handler(&self, handler: ReadHandler) {
        self.handler.set(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_set()
    }

    /// Tear down: clear handler, stop and release the unit, release the session
    pub fn stop(&mut self) {
        self.handler.clear();
        if self.lifecycle.shutdown() {
            debug!("capture: hardware released");
        }
        self.session.take();
    }
}

impl Drop for CaptureBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBridge")
            .field("params", &self.params)
            .field("hardware_rate", &self.hardware_rate)
            .field("state", &self.state())
            .finish()
    }
}

/// Slack on top of the resampler's look-ahead; its pull size wobbles by a
/// frame around the nominal ratio
const PULL_JITTER_FRAMES: usize = 2;

/// Everything the input callback owns
struct CaptureState {
    converter: FormatConverter,
    /// Hardware-format frames not yet converted, oldest first
    staging: PcmVec,
    /// Frames currently held in `staging`
    pending: usize,
    /// One converted application period
    output: PcmVec,
    channels: usize,
    hardware_period: usize,
}

impl CaptureState {
    fn new(
        converter: FormatConverter,
        staging: PcmVec,
        output: PcmVec,
        channels: usize,
        hardware_period: usize,
    ) -> Self {
        let mut st = Self {
            converter,
            staging,
            pending: 0,
            output,
            channels,
            hardware_period,
        };
        st.rewind();
        st
    }

    fn capacity(&self) -> usize {
        self.staging.len() / self.channels
    }

    fn period_frames(&self) -> usize {
        self.output.len() / self.channels
    }

    /// Empty the FIFO and pre-fill it with the converter's look-ahead as
    /// silence, so a completion of one hardware period yields one period
    fn rewind(&mut self) {
        let period_frames = self.period_frames();
        let needed = self
            .converter
            .source_frames_for(period_frames)
            .unwrap_or(self.hardware_period);
        let slack = if self.converter.is_passthrough() {
            0
        } else {
            PULL_JITTER_FRAMES
        };
        let lead = (needed + slack)
            .saturating_sub(self.hardware_period)
            .min(self.capacity());
        self.staging
            .as_buf_mut()
            .prefix(lead * self.channels)
            .fill_silence();
        self.pending = lead;
    }

    /// Append up to `delivered` frames from the hardware
    fn stage(
        &mut self,
        render: &mut dyn CaptureRender,
        delivered: usize,
    ) -> Result<(), CallbackError> {
        let channels = self.channels;
        let free = self.capacity() - self.pending;
        let frames = if delivered > free {
            warn!(
                "capture: {} frames delivered, staging has room for {}; truncating",
                delivered, free
            );
            free
        } else {
            delivered
        };

        let tail = self
            .staging
            .as_buf_mut()
            .suffix(self.pending * channels)
            .prefix(frames * channels);
        let rendered = render.render(tail)?;
        self.pending += rendered.min(frames * channels) / channels;
        Ok(())
    }

    /// Convert and hand out every whole period the FIFO holds
    fn emit(&mut self, handler: &ReadFn) {
        let channels = self.channels;
        let period_frames = self.period_frames();

        loop {
            let needed = match self.converter.source_frames_for(period_frames) {
                Ok(needed) => needed,
                Err(e) => {
                    warn!("capture: converter unavailable, dropping staged audio: {}", e);
                    self.pending = 0;
                    return;
                }
            };
            if needed == 0 || self.pending < needed {
                return;
            }

            let staged = self.staging.as_buf().prefix(needed * channels);
            let result = self
                .converter
                .convert(self.output.as_buf_mut(), |mut dst: PcmBufMut<'_>| {
                    dst.copy_from(staged).map_or(0, |samples| samples / channels)
                });
            self.pending = self
                .staging
                .discard_front(needed * channels, self.pending * channels)
                / channels;

            match result {
                Ok(_) => handler(self.output.as_buf(), period_frames),
                Err(e) => warn!("capture: conversion failed, dropping period: {}", e),
            }
        }
    }
}

fn input_callback(
    mut st: CaptureState,
    slot: Arc<HandlerSlot<ReadFn>>,
    resync: Arc<AtomicBool>,
) -> InputCallback {
    Box::new(move |render: &mut dyn CaptureRender, delivered: usize| {
        if resync.swap(false, Ordering::AcqRel) {
            st.converter.reset();
            st.rewind();
        }

        // Drain the hardware even when nobody is listening
        if let Err(e) = st.stage(render, delivered) {
            warn!("capture: hardware render failed: {}", e);
            return Err(e);
        }

        match slot.snapshot() {
            Some(handler) => st.emit(&*handler),
            None => st.rewind(),
        }
        Ok(())
    })
}

fn error_callback(on_error: Option<CaptureErrorHandler>) -> ErrorCallback {
    Box::new(move |err: PlatformError| {
        warn!("capture: stream error: {}", err);
        if let Some(handler) = &on_error {
            handler(&err);
        }
    })
}
