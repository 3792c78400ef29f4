//! Registry of attached boards, reconciled against hardware enumeration.
//!
//! `refresh` diffs the attached set against the known set: new identities
//! get a fresh [`DeviceController`], surviving ones keep theirs (with all
//! their settings), and vanished ones are dropped from the map. A caller
//! still holding an `Arc` to a removed controller keeps a usable object;
//! the native session closes when the last reference goes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::controller::{DeviceController, lock};
use crate::error::{LimeError, Result};
use crate::identity::DeviceId;
use crate::native::Driver;

/// Identities added and removed by one [`DeviceRegistry::refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct DeviceRegistry {
    driver: Arc<dyn Driver>,
    /// Serializes whole refreshes, so enumeration results are applied in order.
    refresh_lock: Mutex<()>,
    devices: Mutex<HashMap<DeviceId, Arc<DeviceController>>>,
}

impl DeviceRegistry {
    /// Empty registry. Call [`refresh`](Self::refresh) to populate it.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        DeviceRegistry {
            driver,
            refresh_lock: Mutex::new(()),
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Enumerate attached boards and reconcile the registry with them.
    ///
    /// On enumeration failure the registry is left untouched.
    pub fn refresh(&self) -> Result<RefreshReport> {
        let _refreshing = lock(&self.refresh_lock);

        // Enumeration can take a while; don't block readers during it.
        let attached: HashSet<DeviceId> = self
            .driver
            .list_devices()
            .map_err(LimeError::Enumeration)?
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect();

        let mut report = RefreshReport::default();
        let mut released = Vec::new();
        {
            let mut devices = lock(&self.devices);
            devices.retain(|id, controller| {
                if attached.contains(id) {
                    return true;
                }
                report.removed.push(id.clone());
                released.push(Arc::clone(controller));
                false
            });
            for id in attached {
                if devices.contains_key(&id) {
                    continue;
                }
                let controller = DeviceController::new(id.clone(), Arc::clone(&self.driver));
                devices.insert(id.clone(), Arc::new(controller));
                report.added.push(id);
            }
        }
        report.added.sort();
        report.removed.sort();

        for id in &report.added {
            log::info!("device attached: {}", id.label());
        }
        for id in &report.removed {
            log::info!("device detached: {}", id.label());
        }
        // Native close (for controllers nobody else holds) happens here,
        // outside the map lock.
        drop(released);

        Ok(report)
    }

    /// Snapshot of the current controllers, ordered by identity.
    ///
    /// The snapshot is independent of later refreshes.
    pub fn get_devices(&self) -> Vec<Arc<DeviceController>> {
        let mut list: Vec<_> = lock(&self.devices).values().cloned().collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    /// Raw identity descriptors of the current controllers, one per board.
    pub fn get_device_ids(&self) -> BTreeSet<String> {
        lock(&self.devices).keys().map(DeviceId::descriptor).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.devices).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.devices).is_empty()
    }

    pub fn find(&self, id: &DeviceId) -> Option<Arc<DeviceController>> {
        lock(&self.devices).get(id).cloned()
    }

    /// First controller (in identity order) whose serial equals `serial`.
    pub fn find_by_serial(&self, serial: &str) -> Option<Arc<DeviceController>> {
        self.get_devices()
            .into_iter()
            .find(|c| !serial.is_empty() && c.serial() == serial)
    }

    /// Pick the board to work with: the one with `serial`, or the first
    /// attached board when `serial` is empty.
    pub fn select(&self, serial: &str) -> Result<Arc<DeviceController>> {
        let devices = self.get_devices();
        let serial = serial.trim();
        if serial.is_empty() {
            return devices
                .into_iter()
                .next()
                .ok_or_else(|| LimeError::NotFound("no LimeSDR devices attached".into()));
        }
        if let Some(found) = self.find_by_serial(serial) {
            return Ok(found);
        }
        let available: Vec<&str> = devices
            .iter()
            .map(|c| c.serial())
            .filter(|s| !s.is_empty())
            .collect();
        Err(LimeError::NotFound(if available.is_empty() {
            format!("no device with serial {serial} (none attached)")
        } else {
            format!(
                "no device with serial {serial} (available: {})",
                available.join(", ")
            )
        }))
    }
}
