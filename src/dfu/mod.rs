//! Nordic Secure DFU (Device Firmware Update) over BLE.
//!
//! This module drives the Secure DFU control point state machine of an
//! nRF5 bootloader. The BLE stack itself stays outside: callers supply a
//! [`BleTransport`] and forward control point notifications to the
//! [`DfuNotifier`] handed to it.
//!
//! # Protocol Overview
//!
//! The DFU process consists of:
//! 1. **PRN Setup** - Disable packet receipt notifications
//! 2. **Init Transfer** - Send the init packet as the command object
//! 3. **Firmware Transfer** - Send the binary as page-sized data objects,
//!    each verified by CRC-32 and executed
//! 4. **Activation** - A final execute makes the device reset into the new image
//!
//! # Example
//!
//! ```ignore
//! use nrf_secure_dfu::dfu::{upload_firmware, DfuSettings, DfuState};
//!
//! let state = upload_firmware(
//!     transport,
//!     "app_dfu_package.zip",
//!     DfuSettings::default(),
//!     |stage| println!("{}: {:.0}%", stage.message(), stage.percent()),
//! )?;
//! assert_eq!(state, DfuState::Finished);
//! ```

mod chunker;
mod config;
mod crc;
mod error;
mod firmware_reader;
mod packet;
mod protocol;
mod rendezvous;
mod response;
mod settings;
mod transport;

// Protocol
pub use protocol::{
    run_session_async, upload_firmware, DfuSession, DfuStage, DfuState, TransitionContext,
};

// Wire format
pub use config::{
    describe_result, DfuOpcode, ObjectType, ResultCode, CHUNK_SIZE, CONTROL_POINT_CHAR_UUID,
    FLASH_PAGE_SIZE, PACKET_CHAR_UUID, SECURE_DFU_SERVICE_UUID,
};
pub use crc::{crc32, Crc32};
pub use packet::{
    build_checksum_request, build_create_request, build_execute_request, build_select_request,
    build_set_prn_request,
};
pub use response::{
    decode_notification, decode_response, DecodedNotification, Event, Response, ResponseValue,
};

// Object planning
pub use chunker::{plan_object, ChunkPlan};

// Transport
pub use rendezvous::DfuNotifier;
#[cfg(test)]
pub use transport::MockBleTransport;
pub use transport::{BleTransport, Channel};

// Firmware and settings
pub use error::{DfuError, DfuResult};
pub use firmware_reader::{
    read_firmware_zip, read_firmware_zip_image, FirmwarePackage, ImageKind, ManifestData,
};
pub use settings::{DfuSettings, SettingsManager};
