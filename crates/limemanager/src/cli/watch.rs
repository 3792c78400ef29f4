//! `watch` subcommand — report boards being attached and detached.
//!
//! With `--serial`, the named board is tracked and the command exits once it
//! disappears.

use std::sync::atomic::Ordering;
use std::time::Duration;

use limemanager_lib::DeviceId;
use limemanager_lib::monitor::{ConnectionMonitor, MonitorEvent};
use serde::Serialize;

use super::{Options, RUNNING, Result, load_config, open_registry, print_json};

/// How long one loop iteration waits for a refresh result.
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    Attached { serial: String, identity: String },
    Detached { serial: String, identity: String },
    Disconnected { serial: String, identity: String },
    Error { message: String },
}

impl WatchEvent {
    fn describe(&self) -> String {
        match self {
            WatchEvent::Attached { serial, identity } => format!("+ {}", label(serial, identity)),
            WatchEvent::Detached { serial, identity } => format!("- {}", label(serial, identity)),
            WatchEvent::Disconnected { serial, identity } => {
                format!("Tracked device {} disconnected", label(serial, identity))
            }
            WatchEvent::Error { message } => format!("! refresh failed: {message}"),
        }
    }
}

fn label(serial: &str, identity: &str) -> String {
    if serial.is_empty() {
        identity.to_string()
    } else {
        format!("{serial} ({identity})")
    }
}

fn parts(id: &DeviceId) -> (String, String) {
    (id.serial().to_string(), id.descriptor())
}

/// Flatten monitor events into printable ones.
fn translate(events: Vec<MonitorEvent>) -> Vec<WatchEvent> {
    let mut out = Vec::new();
    for event in events {
        match event {
            MonitorEvent::Refreshed { report, .. } => {
                for id in &report.added {
                    let (serial, identity) = parts(id);
                    out.push(WatchEvent::Attached { serial, identity });
                }
                for id in &report.removed {
                    let (serial, identity) = parts(id);
                    out.push(WatchEvent::Detached { serial, identity });
                }
            }
            MonitorEvent::RefreshFailed(message) => out.push(WatchEvent::Error { message }),
            MonitorEvent::Disconnected(id) => {
                let (serial, identity) = parts(&id);
                out.push(WatchEvent::Disconnected { serial, identity });
            }
        }
    }
    out
}

fn emit(event: &WatchEvent, json: bool) -> Result<()> {
    if json {
        print_json(event)
    } else {
        println!("{}", event.describe());
        Ok(())
    }
}

pub(super) fn cmd_watch(interval_ms: Option<u64>, opts: &Options) -> Result<()> {
    let config = load_config(opts.config_path.as_deref());
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.poll_interval());

    let registry = open_registry()?;
    let mut monitor = ConnectionMonitor::new(registry.clone(), interval);

    // Boards already present are reported as attached up front.
    for device in registry.get_devices() {
        let (serial, identity) = parts(device.id());
        emit(&WatchEvent::Attached { serial, identity }, opts.json)?;
    }

    if let Some(serial) = opts.serial.as_deref() {
        let device = registry.select(serial)?;
        monitor.track(device.id().clone());
        if !opts.json {
            println!("Tracking {} (Ctrl+C to stop)", device.id().label());
        }
    } else if !opts.json {
        println!(
            "Watching for LimeSDR devices every {} ms (Ctrl+C to stop)",
            interval.as_millis()
        );
    }

    while RUNNING.load(Ordering::SeqCst) {
        monitor.tick();
        for event in translate(monitor.wait_results(WAIT_SLICE)) {
            emit(&event, opts.json)?;
            if matches!(event, WatchEvent::Disconnected { .. }) {
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use limemanager_lib::registry::RefreshReport;

    const A: &str = "LimeSDR-USB, addr=1d50:6108, serial=AAAA";

    #[test]
    fn refreshed_event_expands_to_attach_and_detach() {
        let events = translate(vec![MonitorEvent::Refreshed {
            report: RefreshReport {
                added: vec![DeviceId::new(A)],
                removed: vec![DeviceId::new("addr=2")],
            },
            devices: vec![],
        }]);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].describe(),
            "+ AAAA (LimeSDR-USB, addr=1d50:6108, serial=AAAA)"
        );
        assert_eq!(events[1].describe(), "- addr=2");
    }

    #[test]
    fn json_event_is_tagged() {
        let event = WatchEvent::Disconnected {
            serial: "AAAA".into(),
            identity: A.into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "disconnected");
        assert_eq!(value["serial"], "AAAA");
    }

    #[test]
    fn refresh_failure_is_reported() {
        let events = translate(vec![MonitorEvent::RefreshFailed("boom".into())]);
        assert_eq!(events[0].describe(), "! refresh failed: boom");
    }
}
