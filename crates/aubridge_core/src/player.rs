//! Playback Bridge
//!
//! Pulls application-format samples from a [`WriteHandler`] and hands the
//! output unit buffers at its hardware rate.
//!
//! ```text
//! hardware render(N frames @ hw rate)
//!   └─ FormatConverter::convert(N)
//!        └─ producer: write handler fills M frames @ app rate
//! ```
//!
//! # Real-Time Safety
//!
//! The render callback owns the converter and its scratch buffers. Per period
//! it takes the handler lock once to clone an `Arc`; it never allocates and
//! only logs when a conversion fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use aubridge_dsp::{FormatConverter, PcmBufMut};
use aubridge_platform::{Direction, HardwareFormat, RenderCallback};

use crate::config::{PlaybackRate, StreamParameters};
use crate::driver::AudioDriver;
use crate::error::{BridgeError, BridgeResult};
use crate::handler::{HandlerSlot, WriteFn, WriteHandler};
use crate::interruption::SessionHandle;
use crate::lifecycle::{BridgeState, UnitLifecycle};

/// Output stream bridging a write handler to an output unit
pub struct PlaybackBridge {
    params: StreamParameters,
    hardware_rate: u32,
    handler: Arc<HandlerSlot<WriteFn>>,
    lifecycle: Arc<UnitLifecycle>,
    session: Option<SessionHandle>,
}

impl PlaybackBridge {
    /// Negotiate an output unit for `params` and start it
    ///
    /// Nothing is left running if this fails.
    pub fn new(
        driver: &AudioDriver,
        params: &StreamParameters,
        device: Option<&str>,
        handler: WriteHandler,
    ) -> BridgeResult<Self> {
        Self::build(driver, params, device, handler).inspect_err(|e| {
            error!("playback: alloc failed: {}", e);
        })
    }

    fn build(
        driver: &AudioDriver,
        params: &StreamParameters,
        device: Option<&str>,
        handler: WriteHandler,
    ) -> BridgeResult<Self> {
        params.validate().map_err(BridgeError::InvalidArgument)?;
        let config = driver.config();
        config.validate().map_err(BridgeError::InvalidArgument)?;

        let unit = driver.component().instantiate(Direction::Output, device)?;

        let hardware_rate = match config.playback_rate {
            PlaybackRate::Fixed(rate) => rate,
            PlaybackRate::Queried => unit.hardware_sample_rate()?,
        };
        info!("playback: hardware srate {} Hz", hardware_rate);

        let channels = params.channels as usize;
        let hardware_period = params.period_frames_at(hardware_rate).max(1);
        let app_format = params.stream_format();

        let converter = FormatConverter::new(
            app_format,
            app_format.with_rate(hardware_rate),
            hardware_period * config.period_headroom,
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
        unit.set_render_callback(render_callback(
            converter,
            Arc::clone(&slot),
            Arc::clone(&resync),
            channels,
        ))?;
        unit.initialize()?;

        let lifecycle = UnitLifecycle::new(Direction::Output, unit, resync);
        let session = driver.coordinator().subscribe(lifecycle.listener());
        if let Err(e) = lifecycle.start() {
            // Release the unit while the session is still held
            lifecycle.shutdown();
            drop(session);
            return Err(e);
        }

        info!(
            "playback: {} Hz → {} Hz, {} ch, {}, {} ms",
            params.sample_rate, hardware_rate, params.channels, params.format, params.ptime_ms
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

    /// Rate the converter targets on the hardware side
    pub fn hardware_rate(&self) -> u32 {
        self.hardware_rate
    }

    pub fn state(&self) -> BridgeState {
        self.lifecycle.state()
    }

    /// Detach the application; later periods render nothing
    pub fn clear_handler(&self) {
        self.handler.clear();
    }

    pub fn set_handler(&self, handler: WriteHandler) {
        self.handler.set(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_set()
    }

    /// Tear down: clear handler, stop and release the unit, release the session
    pub fn stop(&mut self) {
        self.handler.clear();
        if self.lifecycle.shutdown() {
            debug!("playback: hardware released");
        }
        self.session.take();
    }
}

impl Drop for PlaybackBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PlaybackBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackBridge")
            .field("params", &self.params)
            .field("hardware_rate", &self.hardware_rate)
            .field("state", &self.state())
            .finish()
    }
}

fn render_callback(
    mut converter: FormatConverter,
    slot: Arc<HandlerSlot<WriteFn>>,
    resync: Arc<AtomicBool>,
    channels: usize,
) -> RenderCallback {
    // Larger hardware requests are converted in pieces of this size
    let chunk_samples = converter.max_frames() * channels;

    Box::new(move |mut out: PcmBufMut<'_>| {
        let Some(handler) = slot.snapshot() else {
            return Ok(());
        };
        if resync.swap(false, Ordering::AcqRel) {
            converter.reset();
        }

        let total = out.len();
        let mut offset = 0;
        while offset < total {
            let piece = out.reborrow().suffix(offset).prefix(chunk_samples);
            let len = piece.len();

            let result = converter.convert(piece, |buf| {
                let frames = buf.frames(channels);
                handler(buf);
                frames
            });
            if let Err(e) = result {
                warn!("playback: conversion failed, rendering silence: {}", e);
                out.reborrow().suffix(offset).fill_silence();
                break;
            }
            offset += len;
        }
        Ok(())
    })
}
