//! Shared helpers for bridge integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use aubridge_core::{
    AudioDriver, BridgeConfig, PcmBuf, PcmBufMut, ReadHandler, SampleFormat, StreamParameters,
    WriteHandler,
};
use aubridge_platform::manual::ManualComponent;

/// Route bridge logs to the test output (`RUST_LOG=debug cargo test`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Manual hardware at the given input/output rates and a driver on top of it
pub fn manual_driver(input_rate: u32, output_rate: u32) -> (Arc<ManualComponent>, AudioDriver) {
    manual_driver_with(input_rate, output_rate, BridgeConfig::default())
}

pub fn manual_driver_with(
    input_rate: u32,
    output_rate: u32,
    config: BridgeConfig,
) -> (Arc<ManualComponent>, AudioDriver) {
    init_tracing();
    let component = Arc::new(ManualComponent::new(input_rate, output_rate));
    let driver = AudioDriver::new(component.clone()).with_config(config);
    (component, driver)
}

/// 48 kHz stereo s16 with 20 ms periods (960 frames / 1920 samples)
pub fn voice_params() -> StreamParameters {
    StreamParameters::new(48000, 2, SampleFormat::S16, 20)
}

/// Write handler that fills every requested sample with a constant
#[derive(Default)]
pub struct WriteTap {
    calls: AtomicUsize,
    samples: AtomicUsize,
    max_request: AtomicUsize,
    odd_requests: AtomicUsize,
}

impl WriteTap {
    pub fn handler(self: &Arc<Self>, value: i16, channels: usize) -> WriteHandler {
        let tap = Arc::clone(self);
        Arc::new(move |buf: PcmBufMut<'_>| {
            let len = buf.len();
            tap.calls.fetch_add(1, Ordering::SeqCst);
            tap.samples.fetch_add(len, Ordering::SeqCst);
            tap.max_request.fetch_max(len, Ordering::SeqCst);
            if len % channels != 0 {
                tap.odd_requests.fetch_add(1, Ordering::SeqCst);
            }
            match buf {
                PcmBufMut::S16(s) => s.fill(value),
                PcmBufMut::F32(s) => s.fill(value as f32 / 32768.0),
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn max_request(&self) -> usize {
        self.max_request.load(Ordering::SeqCst)
    }

    pub fn odd_requests(&self) -> usize {
        self.odd_requests.load(Ordering::SeqCst)
    }
}

/// Read handler that records every delivery
#[derive(Default)]
pub struct ReadTap {
    /// (sample count, frame count, first sample as i16 if s16)
    deliveries: Mutex<Vec<(usize, usize, Option<i16>)>>,
    last: Mutex<Vec<i16>>,
    /// Every s16 sample delivered, in order
    stream: Mutex<Vec<i16>>,
}

impl ReadTap {
    pub fn handler(self: &Arc<Self>) -> ReadHandler {
        let tap = Arc::clone(self);
        Arc::new(move |buf: PcmBuf<'_>, frames: usize| {
            let first = buf.as_s16().and_then(|s| s.first().copied());
            tap.deliveries.lock().push((buf.len(), frames, first));
            if let Some(samples) = buf.as_s16() {
                *tap.last.lock() = samples.to_vec();
                tap.stream.lock().extend_from_slice(samples);
            }
        })
    }

    pub fn deliveries(&self) -> Vec<(usize, usize, Option<i16>)> {
        self.deliveries.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn last(&self) -> Vec<i16> {
        self.last.lock().clone()
    }

    pub fn stream(&self) -> Vec<i16> {
        self.stream.lock().clone()
    }
}
