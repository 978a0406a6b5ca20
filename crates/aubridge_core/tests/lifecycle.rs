//! Construction, teardown and session interruption of both bridges

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use aubridge_core::{
    AudioDriver, BridgeConfig, BridgeError, BridgeState, CaptureBridge, DriverRegistry,
    InterruptionCoordinator, PcmBuf, PcmBufMut, PlaybackBridge, SampleFormat, StreamParameters,
    DEFAULT_DRIVER_NAME,
};
use aubridge_platform::manual::{Failure, ManualComponent, UnitEvent};
use aubridge_platform::{
    CallbackError, Direction, ErrorCallback, HardwareComponent, HardwareFormat, HardwareUnit,
    InputCallback, PlatformError, RenderCallback,
};

use common::{manual_driver, manual_driver_with, voice_params, ReadTap, WriteTap};

#[test]
fn test_playback_teardown_order() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(WriteTap::default());
    let bridge =
        PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap();
    assert_eq!(driver.coordinator().subscriber_count(), 1);

    component.clear_journal();
    drop(bridge);

    assert_eq!(
        component.journal(),
        vec![
            UnitEvent::Stopped(Direction::Output),
            UnitEvent::Uninitialized(Direction::Output),
            UnitEvent::CallbackReleased(Direction::Output),
            UnitEvent::Disposed(Direction::Output),
        ]
    );
    assert_eq!(driver.coordinator().subscriber_count(), 0);
}

#[test]
fn test_capture_teardown_order() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(ReadTap::default());
    let mut bridge =
        CaptureBridge::new(&driver, &voice_params(), None, tap.handler(), None).unwrap();

    component.clear_journal();
    bridge.stop();
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert_eq!(
        component.journal(),
        vec![
            UnitEvent::Stopped(Direction::Input),
            UnitEvent::Uninitialized(Direction::Input),
            UnitEvent::CallbackReleased(Direction::Input),
            UnitEvent::Disposed(Direction::Input),
        ]
    );

    // Second stop and the drop are no-ops
    bridge.stop();
    drop(bridge);
    assert_eq!(component.journal().len(), 4);
    assert_eq!(driver.coordinator().subscriber_count(), 0);
}

#[test]
fn test_handler_is_detached_before_hardware_stops() {
    // f32 passthrough so the render fired from inside stop() reaches the handler
    let params = StreamParameters::new(48000, 2, SampleFormat::F32, 20);

    let (component, driver) = manual_driver(48000, 48000);
    let tap = Arc::new(WriteTap::default());
    let bridge = PlaybackBridge::new(&driver, &params, None, tap.handler(1, 2)).unwrap();
    let unit = component.last_unit(Direction::Output).unwrap();
    unit.set_render_on_stop(true);

    // An interruption stops the unit with the handler still bound
    driver.coordinator().begin_interruption();
    assert_eq!(tap.calls(), 1);
    driver.coordinator().end_interruption();

    // Teardown clears the handler first, so the last period renders nothing
    drop(bridge);
    assert_eq!(tap.calls(), 1);
}

#[test]
fn test_repeated_and_unmatched_interruptions() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(WriteTap::default());
    let bridge =
        PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(10000, 2)).unwrap();
    let unit = component.last_unit(Direction::Output).unwrap();
    let coordinator = driver.coordinator().clone();
    let mut out = vec![0_i16; 882];

    coordinator.begin_interruption();
    coordinator.begin_interruption();
    assert_eq!(bridge.state(), BridgeState::Interrupted);
    assert!(!unit.is_running());
    assert_eq!(
        unit.fire_render(PcmBufMut::S16(&mut out)),
        Err(CallbackError::NotRunning)
    );
    assert_eq!(tap.calls(), 0);

    coordinator.end_interruption();
    assert_eq!(bridge.state(), BridgeState::Running);
    assert!(unit.is_running());
    for _ in 0..50 {
        assert_eq!(unit.fire_render(PcmBufMut::S16(&mut out)), Ok(()));
    }
    assert!(tap.calls() > 0);
    assert!(out.iter().all(|s| (9000..=11000).contains(s)));

    // End without a matching begin: the stream carries on without a glitch
    coordinator.end_interruption();
    assert_eq!(bridge.state(), BridgeState::Running);
    assert!(unit.is_running());
    for _ in 0..3 {
        assert_eq!(unit.fire_render(PcmBufMut::S16(&mut out)), Ok(()));
        let low = out.iter().copied().min().unwrap();
        assert!(low >= 9000, "level dropped to {low} after unmatched end");
    }
}

#[test]
fn test_interruption_reaches_every_bridge_on_the_session() {
    let (component, driver) = manual_driver(44100, 44100);
    let writer = Arc::new(WriteTap::default());
    let reader = Arc::new(ReadTap::default());
    let player =
        PlaybackBridge::new(&driver, &voice_params(), None, writer.handler(1, 2)).unwrap();
    let recorder =
        CaptureBridge::new(&driver, &voice_params(), None, reader.handler(), None).unwrap();
    assert_eq!(driver.coordinator().subscriber_count(), 2);

    driver.coordinator().begin_interruption();
    assert_eq!(player.state(), BridgeState::Interrupted);
    assert_eq!(recorder.state(), BridgeState::Interrupted);

    let input = component.last_unit(Direction::Input).unwrap();
    let captured = vec![0_i16; 882];
    assert_eq!(
        input.fire_capture(PcmBuf::S16(&captured)),
        Err(CallbackError::NotRunning)
    );

    driver.coordinator().end_interruption();
    assert_eq!(player.state(), BridgeState::Running);
    assert_eq!(recorder.state(), BridgeState::Running);
    let report = input.fire_capture(PcmBuf::S16(&captured)).unwrap();
    assert_eq!(report.status, Ok(()));
    assert_eq!(reader.calls(), 1);
}

#[test]
fn test_interruption_after_stop_is_ignored() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(WriteTap::default());
    let mut bridge =
        PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap();
    bridge.stop();
    component.clear_journal();

    driver.coordinator().begin_interruption();
    driver.coordinator().end_interruption();
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(component.journal().is_empty());
}

#[test]
fn test_teardown_waits_for_in_flight_render() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(WriteTap::default());
    let bridge =
        PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap();
    let unit = component.last_unit(Direction::Output).unwrap();

    let firing = thread::spawn(move || {
        let mut out = vec![0_i16; 882];
        let mut rendered = 0;
        loop {
            match unit.fire_render(PcmBufMut::S16(&mut out)) {
                Ok(()) => rendered += 1,
                Err(CallbackError::NotRunning) => break,
                Err(e) => panic!("unexpected callback error: {}", e),
            }
        }
        rendered
    });

    thread::sleep(Duration::from_millis(20));
    drop(bridge);
    let rendered = firing.join().unwrap();

    assert!(rendered > 0);
    assert_eq!(component.journal().last(), Some(&UnitEvent::Disposed(Direction::Output)));
}

#[test]
fn test_interruptions_racing_teardown() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(ReadTap::default());
    let bridge =
        CaptureBridge::new(&driver, &voice_params(), None, tap.handler(), None).unwrap();

    let coordinator = driver.coordinator().clone();
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let session = thread::spawn(move || {
        while !flag.load(Ordering::Acquire) {
            coordinator.begin_interruption();
            coordinator.end_interruption();
        }
        // A few more after teardown finished
        for _ in 0..10 {
            coordinator.begin_interruption();
            coordinator.end_interruption();
        }
    });

    thread::sleep(Duration::from_millis(10));
    drop(bridge);
    done.store(true, Ordering::Release);
    session.join().unwrap();

    let journal = component.journal();
    assert_eq!(journal.last(), Some(&UnitEvent::Disposed(Direction::Input)));
    assert_eq!(
        journal
            .iter()
            .filter(|e| **e == UnitEvent::Disposed(Direction::Input))
            .count(),
        1
    );
}

#[test]
fn test_invalid_parameters_touch_no_hardware() {
    let (component, driver) = manual_driver(44100, 44100);
    let tap = Arc::new(WriteTap::default());

    let no_channels = StreamParameters::new(48000, 0, SampleFormat::S16, 20);
    let err = PlaybackBridge::new(&driver, &no_channels, None, tap.handler(1, 2)).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));

    let reader = Arc::new(ReadTap::default());
    let no_ptime = StreamParameters::new(48000, 2, SampleFormat::S16, 0);
    let err = CaptureBridge::new(&driver, &no_ptime, None, reader.handler(), None).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));

    assert!(component.journal().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = BridgeConfig {
        period_headroom: 0,
        ..BridgeConfig::default()
    };
    let (component, driver) = manual_driver_with(44100, 44100, config);
    let tap = Arc::new(WriteTap::default());

    let err = PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));
    assert!(component.journal().is_empty());
}

#[test]
fn test_missing_device_is_unavailable() {
    let (component, driver) = manual_driver(44100, 44100);
    component.inject(Failure::Instantiate);
    let tap = Arc::new(WriteTap::default());

    let err = PlaybackBridge::new(&driver, &voice_params(), Some("USB Headset"), tap.handler(1, 2))
        .unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));
    assert!(err.to_string().contains("USB Headset"));
    assert!(component.journal().is_empty());
}

#[test]
fn test_rejected_format_releases_unit() {
    let (component, driver) = manual_driver(44100, 44100);
    component.inject(Failure::RejectFormat);
    let tap = Arc::new(WriteTap::default());

    let err = PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));
    assert_eq!(
        component.journal(),
        vec![
            UnitEvent::Instantiated(Direction::Output),
            UnitEvent::Disposed(Direction::Output),
        ]
    );
    assert_eq!(driver.coordinator().subscriber_count(), 0);
    assert_eq!(tap.calls(), 0);
}

#[test]
fn test_start_failure_unwinds_everything() {
    let (component, driver) = manual_driver(44100, 44100);
    component.inject(Failure::Start);
    let tap = Arc::new(ReadTap::default());

    let err =
        CaptureBridge::new(&driver, &voice_params(), None, tap.handler(), None).unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));

    let journal = component.journal();
    assert!(!journal.contains(&UnitEvent::Started(Direction::Input)));
    assert_eq!(
        journal[journal.len() - 4..],
        [
            UnitEvent::Stopped(Direction::Input),
            UnitEvent::Uninitialized(Direction::Input),
            UnitEvent::CallbackReleased(Direction::Input),
            UnitEvent::Disposed(Direction::Input),
        ]
    );
    assert_eq!(driver.coordinator().subscriber_count(), 0);
}

/// Component that records the session's subscriber count whenever one of its
/// units is dropped
struct SessionWatch {
    inner: Arc<ManualComponent>,
    coordinator: InterruptionCoordinator,
    seen: Arc<Mutex<Vec<usize>>>,
}

struct WatchedUnit {
    inner: Box<dyn HardwareUnit>,
    coordinator: InterruptionCoordinator,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl HardwareComponent for SessionWatch {
    fn name(&self) -> &str {
        "watch"
    }

    fn instantiate(
        &self,
        direction: Direction,
        device: Option<&str>,
    ) -> Result<Box<dyn HardwareUnit>, PlatformError> {
        Ok(Box::new(WatchedUnit {
            inner: self.inner.instantiate(direction, device)?,
            coordinator: self.coordinator.clone(),
            seen: Arc::clone(&self.seen),
        }))
    }

    fn default_input_sample_rate(&self) -> Result<u32, PlatformError> {
        self.inner.default_input_sample_rate()
    }

    fn default_output_sample_rate(&self) -> Result<u32, PlatformError> {
        self.inner.default_output_sample_rate()
    }
}

impl HardwareUnit for WatchedUnit {
    fn direction(&self) -> Direction {
        self.inner.direction()
    }

    fn set_stream_format(&self, format: HardwareFormat) -> Result<(), PlatformError> {
        self.inner.set_stream_format(format)
    }

    fn stream_format(&self) -> Option<HardwareFormat> {
        self.inner.stream_format()
    }

    fn set_render_callback(&self, callback: RenderCallback) -> Result<(), PlatformError> {
        self.inner.set_render_callback(callback)
    }

    fn set_input_callback(&self, callback: InputCallback) -> Result<(), PlatformError> {
        self.inner.set_input_callback(callback)
    }

    fn set_error_callback(&self, callback: ErrorCallback) -> Result<(), PlatformError> {
        self.inner.set_error_callback(callback)
    }

    fn initialize(&self) -> Result<(), PlatformError> {
        self.inner.initialize()
    }

    fn start(&self) -> Result<(), PlatformError> {
        self.inner.start()
    }

    fn stop(&self) -> Result<(), PlatformError> {
        self.inner.stop()
    }

    fn uninitialize(&self) -> Result<(), PlatformError> {
        self.inner.uninitialize()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn hardware_sample_rate(&self) -> Result<u32, PlatformError> {
        self.inner.hardware_sample_rate()
    }
}

impl Drop for WatchedUnit {
    fn drop(&mut self) {
        self.seen.lock().push(self.coordinator.subscriber_count());
    }
}

fn watched_driver() -> (Arc<ManualComponent>, AudioDriver, Arc<Mutex<Vec<usize>>>) {
    let component = Arc::new(ManualComponent::new(44100, 44100));
    let coordinator = InterruptionCoordinator::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let watch = SessionWatch {
        inner: Arc::clone(&component),
        coordinator: coordinator.clone(),
        seen: Arc::clone(&seen),
    };
    let driver = AudioDriver::new(Arc::new(watch)).with_coordinator(coordinator);
    (component, driver, seen)
}

#[test]
fn test_unit_released_before_session_on_start_failure() {
    let (component, driver, seen) = watched_driver();
    component.inject(Failure::Start);

    let tap = Arc::new(WriteTap::default());
    let err = PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));

    // The session was still held while the unit went away
    assert_eq!(*seen.lock(), vec![1]);
    assert_eq!(driver.coordinator().subscriber_count(), 0);
    assert_eq!(
        component.journal().last(),
        Some(&UnitEvent::Disposed(Direction::Output))
    );

    component.inject(Failure::Start);
    let reader = Arc::new(ReadTap::default());
    let err = CaptureBridge::new(&driver, &voice_params(), None, reader.handler(), None).unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));
    assert_eq!(*seen.lock(), vec![1, 1]);
    assert_eq!(driver.coordinator().subscriber_count(), 0);
}

#[test]
fn test_unit_released_before_session_on_stop() {
    let (_component, driver, seen) = watched_driver();
    let tap = Arc::new(WriteTap::default());
    let mut bridge =
        PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap();

    bridge.stop();
    assert_eq!(*seen.lock(), vec![1]);
    assert_eq!(driver.coordinator().subscriber_count(), 0);
}

#[test]
fn test_initialize_failure_releases_callback() {
    let (component, driver) = manual_driver(44100, 44100);
    component.inject(Failure::Initialize);
    let tap = Arc::new(WriteTap::default());

    let err = PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap_err();
    assert!(matches!(err, BridgeError::DeviceUnavailable { .. }));

    let journal = component.journal();
    assert!(!journal.contains(&UnitEvent::Initialized(Direction::Output)));
    assert_eq!(
        journal[journal.len() - 2..],
        [
            UnitEvent::CallbackReleased(Direction::Output),
            UnitEvent::Disposed(Direction::Output),
        ]
    );

    // The component recovers for the next allocation
    let bridge = PlaybackBridge::new(&driver, &voice_params(), None, tap.handler(1, 2)).unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);
}

#[test]
fn test_registry_allocates_through_named_driver() {
    let (_component, driver) = manual_driver(44100, 44100);
    let registry = DriverRegistry::init(DEFAULT_DRIVER_NAME, driver);

    let writer = Arc::new(WriteTap::default());
    let reader = Arc::new(ReadTap::default());
    let mut player = registry
        .alloc_player(DEFAULT_DRIVER_NAME, &voice_params(), None, writer.handler(1, 2))
        .unwrap();
    let source = registry
        .alloc_source(DEFAULT_DRIVER_NAME, &voice_params(), None, reader.handler(), None)
        .unwrap();

    assert_eq!(player.state(), BridgeState::Running);
    assert_eq!(player.hardware_rate(), 44100);
    assert_eq!(source.params().period_frames(), 960);

    player.stop();
    assert_eq!(player.state(), BridgeState::Stopped);
    assert_eq!(source.state(), BridgeState::Running);

    let err = registry
        .alloc_player("coreaudio", &voice_params(), None, writer.handler(1, 2))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, BridgeError::DriverNotFound(_)));
}
