//! limemanager — discovery, hotplug tracking and lifecycle control for LimeSDR boards.

pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod identity;
pub mod monitor;
pub mod native;
pub mod registry;

pub use controller::DeviceController;
pub use error::LimeError;
pub use identity::DeviceId;
pub use registry::DeviceRegistry;
