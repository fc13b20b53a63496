//! Host-side driver for the Nordic Secure DFU protocol over BLE.

pub mod dfu;

#[cfg(test)]
mod test_helpers;
