//! Shared fixtures for unit tests.

mod fake_device;
mod fixtures;
mod temp;

pub use fake_device::SimulatedPeripheral;
pub use fixtures::{firmware_payload, init_payload, PackageBuilder};
pub use temp::TestContext;
