//! Periodic hotplug polling off the caller's thread.
//!
//! The owner calls [`ConnectionMonitor::tick`] from its own loop. When the
//! interval has elapsed and no refresh is running, a short-lived worker
//! thread refreshes the registry and sends the result back over a channel.
//! A refresh stays outstanding until its result has been collected by
//! [`ConnectionMonitor::poll_results`] or [`ConnectionMonitor::wait_results`];
//! a tick that lands before then is skipped, not queued.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::controller::DeviceController;
use crate::error::Result;
use crate::identity::DeviceId;
use crate::registry::{DeviceRegistry, RefreshReport};

type RefreshOutcome = Result<(RefreshReport, Vec<Arc<DeviceController>>)>;

/// What the monitor observed.
#[derive(Debug)]
pub enum MonitorEvent {
    /// A refresh completed. `devices` is the snapshot taken right after it.
    Refreshed {
        report: RefreshReport,
        devices: Vec<Arc<DeviceController>>,
    },
    /// Enumeration failed; the registry is unchanged.
    RefreshFailed(String),
    /// The tracked board is no longer attached. Reported once.
    Disconnected(DeviceId),
}

pub struct ConnectionMonitor {
    registry: Arc<DeviceRegistry>,
    interval: Duration,
    tracked: Option<DeviceId>,
    last_submit: Option<Instant>,
    in_flight: bool,
    tx: Sender<RefreshOutcome>,
    rx: Receiver<RefreshOutcome>,
}

impl ConnectionMonitor {
    pub fn new(registry: Arc<DeviceRegistry>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            registry,
            interval,
            tracked: None,
            last_submit: None,
            in_flight: false,
            tx,
            rx,
        }
    }

    /// Watch `id` and emit [`MonitorEvent::Disconnected`] when it disappears.
    pub fn track(&mut self, id: DeviceId) {
        self.tracked = Some(id);
    }

    pub fn tracked(&self) -> Option<&DeviceId> {
        self.tracked.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a refresh is running or its result has not been collected yet.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
    }

    /// Start a background refresh if one is due. Returns `true` if started.
    pub fn tick(&mut self) -> bool {
        if self.in_flight {
            log::trace!("refresh still outstanding, skipping tick");
            return false;
        }
        if let Some(last) = self.last_submit
            && last.elapsed() < self.interval
        {
            return false;
        }

        self.in_flight = true;
        self.last_submit = Some(Instant::now());

        let registry = Arc::clone(&self.registry);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name("lime-refresh".into())
            .spawn(move || {
                let outcome = registry
                    .refresh()
                    .map(|report| (report, registry.get_devices()));
                // Receiver gone means the monitor was dropped; nothing to do.
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            log::warn!("could not start refresh thread: {e}");
            self.in_flight = false;
            return false;
        }
        true
    }

    /// Collect finished refreshes without blocking.
    pub fn poll_results(&mut self) -> Vec<MonitorEvent> {
        let outcomes: Vec<_> = self.rx.try_iter().collect();
        self.translate(outcomes)
    }

    /// Block up to `timeout` for at least one finished refresh, then collect
    /// everything available.
    pub fn wait_results(&mut self, timeout: Duration) -> Vec<MonitorEvent> {
        let mut outcomes = match self.rx.recv_timeout(timeout) {
            Ok(outcome) => vec![outcome],
            Err(RecvTimeoutError::Timeout) => return Vec::new(),
            // We hold a sender ourselves, so this can't happen.
            Err(RecvTimeoutError::Disconnected) => return Vec::new(),
        };
        outcomes.extend(self.rx.try_iter());
        self.translate(outcomes)
    }

    fn translate(&mut self, outcomes: Vec<RefreshOutcome>) -> Vec<MonitorEvent> {
        if !outcomes.is_empty() {
            self.in_flight = false;
        }
        let mut events = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((report, devices)) => {
                    let lost = self
                        .tracked
                        .as_ref()
                        .is_some_and(|id| !devices.iter().any(|d| d.id() == id));
                    events.push(MonitorEvent::Refreshed { report, devices });
                    if lost && let Some(id) = self.tracked.take() {
                        log::warn!("tracked device disconnected: {}", id.label());
                        events.push(MonitorEvent::Disconnected(id));
                    }
                }
                Err(e) => {
                    log::warn!("device refresh failed: {e}");
                    events.push(MonitorEvent::RefreshFailed(e.to_string()));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::MockDriver;

    const A: &str = "LimeSDR-USB, addr=1d50:6108, serial=AAAA";
    const B: &str = "LimeSDR Mini, addr=0403:601f, serial=BBBB";
    const WAIT: Duration = Duration::from_secs(5);

    fn monitor(driver: &MockDriver, interval: Duration) -> ConnectionMonitor {
        let registry = Arc::new(DeviceRegistry::new(Arc::new(driver.clone())));
        ConnectionMonitor::new(registry, interval)
    }

    #[test]
    fn first_tick_refreshes_in_background() {
        let driver = MockDriver::with_devices(&[A, B]);
        let mut mon = monitor(&driver, Duration::from_secs(60));
        assert!(mon.tick());
        let events = mon.wait_results(WAIT);
        match events.as_slice() {
            [MonitorEvent::Refreshed { report, devices }] => {
                assert_eq!(report.added.len(), 2);
                assert_eq!(devices.len(), 2);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(!mon.is_refreshing());
    }

    #[test]
    fn tick_respects_interval() {
        let driver = MockDriver::with_devices(&[A]);
        let mut mon = monitor(&driver, Duration::from_secs(60));
        assert!(mon.tick());
        mon.wait_results(WAIT);
        assert!(!mon.tick(), "interval has not elapsed");
    }

    #[test]
    fn tick_skips_while_refresh_in_flight() {
        let driver = MockDriver::with_devices(&[A]);
        driver.faults().list_delay = Duration::from_millis(300);
        let mut mon = monitor(&driver, Duration::ZERO);
        assert!(mon.tick());
        assert!(!mon.tick());
        assert!(!mon.tick());
        let events = mon.wait_results(WAIT);
        assert_eq!(events.len(), 1);
        // Nothing was queued behind the first refresh.
        assert!(mon.wait_results(Duration::from_millis(100)).is_empty());
    }

    #[test]
    fn uncollected_result_blocks_next_tick() {
        let driver = MockDriver::with_devices(&[A]);
        let mut mon = monitor(&driver, Duration::ZERO);
        assert!(mon.tick());
        // Let the worker finish and queue its result.
        std::thread::sleep(Duration::from_millis(200));
        assert!(mon.is_refreshing());
        assert!(!mon.tick(), "previous result not collected yet");

        assert_eq!(mon.poll_results().len(), 1);
        assert!(!mon.is_refreshing());
        assert!(mon.tick());
        assert_eq!(mon.wait_results(WAIT).len(), 1);
    }

    #[test]
    fn poll_without_results_is_empty() {
        let driver = MockDriver::with_devices(&[A]);
        let mut mon = monitor(&driver, Duration::from_secs(1));
        assert!(mon.poll_results().is_empty());
    }

    #[test]
    fn enumeration_failure_is_reported() {
        let driver = MockDriver::with_devices(&[A]);
        driver.faults().list = true;
        let mut mon = monitor(&driver, Duration::ZERO);
        mon.tick();
        let events = mon.wait_results(WAIT);
        assert!(matches!(
            events.as_slice(),
            [MonitorEvent::RefreshFailed(msg)] if msg.contains("LMS_GetDeviceList")
        ));
    }

    #[test]
    fn tracked_disconnect_fires_once() {
        let driver = MockDriver::with_devices(&[A, B]);
        let mut mon = monitor(&driver, Duration::ZERO);
        mon.track(DeviceId::new(A));

        mon.tick();
        let events = mon.wait_results(WAIT);
        assert!(!events
            .iter()
            .any(|e| matches!(e, MonitorEvent::Disconnected(_))));

        driver.set_present(&[B]);
        mon.tick();
        let events = mon.wait_results(WAIT);
        assert!(matches!(
            events.last(),
            Some(MonitorEvent::Disconnected(id)) if *id == DeviceId::new(A)
        ));
        assert!(mon.tracked().is_none());

        mon.tick();
        let events = mon.wait_results(WAIT);
        assert!(!events
            .iter()
            .any(|e| matches!(e, MonitorEvent::Disconnected(_))));
    }

    #[test]
    fn tracking_absent_device_reports_on_first_refresh() {
        let driver = MockDriver::with_devices(&[B]);
        let mut mon = monitor(&driver, Duration::ZERO);
        mon.track(DeviceId::new(A));
        mon.tick();
        let events = mon.wait_results(WAIT);
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::Disconnected(_))));
    }
}
