//! Integration tests: hotplug reconciliation and controller lifecycle through
//! the public API, backed by the mock driver.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use limemanager_lib::capture::StreamConfig;
use limemanager_lib::controller::{CalibrationStatus, FilterPath, LifecycleState};
use limemanager_lib::monitor::{ConnectionMonitor, MonitorEvent};
use limemanager_lib::native::mock::{Call, MockDriver};
use limemanager_lib::{DeviceId, DeviceRegistry, LimeError};

const A: &str = "LimeSDR-USB, media=USB 3.0, module=FX3, addr=1d50:6108, serial=0009060B00471B22";
const B: &str = "LimeSDR Mini, media=USB 3.0, module=FT601, addr=24607:1027, serial=1D3AC4E2E4D7B1";

fn registry(driver: &MockDriver) -> DeviceRegistry {
    DeviceRegistry::new(Arc::new(driver.clone()))
}

fn identities(reg: &DeviceRegistry) -> BTreeSet<String> {
    reg.get_device_ids()
}

// ── Hotplug cycle ──

#[test]
fn hotplug_cycle_recreates_fresh_controller() {
    let driver = MockDriver::with_devices(&[A]);
    let reg = registry(&driver);

    reg.refresh().unwrap();
    assert_eq!(reg.len(), 1);
    let before = reg.get_devices();
    before[0].set_channels(1, 1).unwrap();
    before[0].set_sample_rate(10e6).unwrap();

    // Unplug: the held snapshot stays valid.
    driver.set_present(&[]);
    let report = reg.refresh().unwrap();
    assert_eq!(report.removed, vec![DeviceId::new(A)]);
    assert!(reg.is_empty());
    assert_eq!(before[0].last_sample_rate(), Some(10e6));
    assert_eq!(before[0].state(), LifecycleState::Configured);

    // Replug: a brand-new controller with default configuration.
    driver.set_present(&[A]);
    reg.refresh().unwrap();
    let after = reg.get_devices();
    assert!(!Arc::ptr_eq(&before[0], &after[0]));
    assert_eq!(after[0].state(), LifecycleState::Unopened);
    assert_eq!(after[0].settings().selection.rx_channel, 0);
    assert_eq!(after[0].last_sample_rate(), None);

    drop(before);
    assert_eq!(driver.open_handles(), 0);
}

#[test]
fn reconciliation_matches_new_enumeration_and_keeps_config() {
    let driver = MockDriver::with_devices(&[A, B]);
    let reg = registry(&driver);
    reg.refresh().unwrap();

    let b = reg.find(&DeviceId::new(B)).unwrap();
    b.set_paths(FilterPath::Low, FilterPath::High).unwrap();
    b.calibrate(5e6).unwrap();
    let saved = b.settings();
    drop(b);

    driver.set_present(&[B]);
    reg.refresh().unwrap();
    assert_eq!(identities(&reg), BTreeSet::from([B.to_string()]));
    let b = reg.find(&DeviceId::new(B)).unwrap();
    assert_eq!(b.settings(), saved);
    assert_eq!(b.calibration(), CalibrationStatus::Calibrated);
}

#[test]
fn enumeration_failure_is_propagated() {
    let driver = MockDriver::with_devices(&[A]);
    driver.faults().list = true;
    let reg = registry(&driver);
    let err = reg.refresh().unwrap_err();
    assert!(matches!(err, LimeError::Enumeration(_)));
    assert!(err.to_string().starts_with("Failed to get device list"));
}

// ── Controller contract ──

#[test]
fn open_twice_does_not_double_acquire() {
    let driver = MockDriver::with_devices(&[A]);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let devices = reg.get_devices();
    let dev = &devices[0];
    dev.open().unwrap();
    let state = dev.settings();
    dev.open().unwrap();
    assert_eq!(dev.settings(), state);
    assert_eq!(driver.open_handles(), 1);
}

#[test]
fn invalid_sample_rates_leave_recorded_rate() {
    let driver = MockDriver::with_devices(&[A]);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let devices = reg.get_devices();
    let dev = &devices[0];
    dev.set_sample_rate(2e6).unwrap();
    for rate in [0.0, -5.0] {
        let err = dev.set_sample_rate(rate).unwrap_err();
        assert!(matches!(err, LimeError::InvalidArgument(_)));
    }
    assert_eq!(dev.last_sample_rate(), Some(2e6));
}

#[test]
fn rx_calibration_failure_never_reports_calibrated() {
    let driver = MockDriver::with_devices(&[A]);
    driver.faults().calibrate_rx = true;
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let devices = reg.get_devices();
    let dev = &devices[0];
    let err = dev.calibrate(5e6).unwrap_err();
    assert!(err.to_string().contains("RX channel 0"));
    assert_eq!(dev.calibration(), CalibrationStatus::Failed);
    assert_eq!(
        driver.count(|c| matches!(c, Call::Calibrate(d, ..) if d.is_tx())),
        0
    );
}

#[test]
fn early_stream_stop_tears_down_exactly_once() {
    let driver = MockDriver::with_devices(&[A]);
    driver.faults().recv_fail_after = Some(2);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let devices = reg.get_devices();
    let dev = &devices[0];

    let mut sink = Vec::new();
    let config = StreamConfig {
        duration: Duration::from_secs(30),
        batch_samples: 64,
        ..StreamConfig::default()
    };
    let summary = dev.stream(&mut sink, &config).unwrap();

    assert!(summary.ended_early);
    assert_eq!(summary.batches, 2);
    assert_eq!(sink.len(), 2 * 64 * 4);
    assert_eq!(driver.count(|c| *c == Call::StopStream), 1);
    assert_eq!(driver.count(|c| *c == Call::DestroyStream), 1);

    // Stop precedes destroy.
    let calls = driver.calls();
    let stop = calls.iter().position(|c| *c == Call::StopStream).unwrap();
    let destroy = calls.iter().position(|c| *c == Call::DestroyStream).unwrap();
    assert!(stop < destroy);
}

#[test]
fn get_sample_rate_before_open_is_not_initialized() {
    let driver = MockDriver::with_devices(&[A]);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let err = reg.get_devices()[0].get_sample_rate().unwrap_err();
    assert_eq!(err.to_string(), "Device not initialized");
}

#[test]
fn registry_teardown_releases_every_handle() {
    let driver = MockDriver::with_devices(&[A, B]);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    for dev in reg.get_devices() {
        dev.open().unwrap();
    }
    assert_eq!(driver.open_handles(), 2);
    drop(reg);
    assert_eq!(driver.open_handles(), 0);
}

// ── Concurrency ──

#[test]
fn snapshot_reads_during_refresh_see_whole_sets() {
    let driver = MockDriver::with_devices(&[A, B]);
    let reg = Arc::new(registry(&driver));
    reg.refresh().unwrap();

    let writer = {
        let reg = Arc::clone(&reg);
        let driver = driver.clone();
        std::thread::spawn(move || {
            for i in 0..50 {
                if i % 2 == 0 {
                    driver.set_present(&[A]);
                } else {
                    driver.set_present(&[A, B]);
                }
                reg.refresh().unwrap();
            }
        })
    };
    for _ in 0..200 {
        let n = reg.get_devices().len();
        assert!(n == 1 || n == 2, "partial set observed: {n}");
    }
    writer.join().unwrap();
}

#[test]
fn operations_on_one_controller_are_serialized() {
    let driver = MockDriver::with_devices(&[A]);
    let reg = registry(&driver);
    reg.refresh().unwrap();
    let dev = Arc::clone(&reg.get_devices()[0]);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let dev = Arc::clone(&dev);
            std::thread::spawn(move || dev.set_sample_rate(1e6 * (i + 1) as f64))
        })
        .collect();
    for w in workers {
        w.join().unwrap().unwrap();
    }
    assert_eq!(driver.count(|c| matches!(c, Call::Open(_))), 1);
    assert_eq!(driver.open_handles(), 1);
}

// ── Monitor ──

#[test]
fn monitor_reports_tracked_disconnect() {
    let driver = MockDriver::with_devices(&[A, B]);
    let reg = Arc::new(registry(&driver));
    let mut monitor = ConnectionMonitor::new(Arc::clone(&reg), Duration::ZERO);
    monitor.track(DeviceId::new(B));

    assert!(monitor.tick());
    let events = monitor.wait_results(Duration::from_secs(5));
    assert!(matches!(events.as_slice(), [MonitorEvent::Refreshed { .. }]));

    driver.set_present(&[A]);
    assert!(monitor.tick());
    let events = monitor.wait_results(Duration::from_secs(5));
    let disconnected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Disconnected(id) => Some(id.serial().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(disconnected, vec!["1D3AC4E2E4D7B1".to_string()]);
    assert_eq!(reg.len(), 1);
}
