//! BLE transport abstraction for Secure DFU.
//!
//! The driver never talks to a radio directly. A transport implements
//! [`BleTransport`] on top of whatever BLE stack the host uses, and forwards
//! control point notifications to the [`DfuNotifier`] it was handed.

use std::fmt;

#[cfg(test)]
use mockall::automock;

use super::config::{CONTROL_POINT_CHAR_UUID, PACKET_CHAR_UUID, SECURE_DFU_SERVICE_UUID};
use super::error::DfuResult;
use super::rendezvous::DfuNotifier;

/// Logical GATT channels used by the DFU service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Requests out, responses notified back.
    ControlPoint,
    /// Raw object bytes, never acknowledged individually.
    Packet,
}

impl Channel {
    /// UUID of the service both channels belong to.
    pub fn service_uuid(&self) -> &'static str {
        SECURE_DFU_SERVICE_UUID
    }

    /// UUID of the characteristic behind this channel.
    pub fn characteristic_uuid(&self) -> &'static str {
        match self {
            Channel::ControlPoint => CONTROL_POINT_CHAR_UUID,
            Channel::Packet => PACKET_CHAR_UUID,
        }
    }

    /// Resolve a (service, characteristic) pair. UUIDs compare case-insensitively.
    pub fn from_uuids(service: &str, characteristic: &str) -> Option<Self> {
        if !service.eq_ignore_ascii_case(SECURE_DFU_SERVICE_UUID) {
            return None;
        }
        [Channel::ControlPoint, Channel::Packet]
            .into_iter()
            .find(|channel| characteristic.eq_ignore_ascii_case(channel.characteristic_uuid()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::ControlPoint => write!(f, "control point"),
            Channel::Packet => write!(f, "packet"),
        }
    }
}

/// Trait for BLE transport operations.
///
/// This abstraction allows for mocking in tests and any BLE stack underneath.
#[cfg_attr(test, automock)]
pub trait BleTransport: Send {
    /// Write without response (packet data).
    fn write_command(&mut self, channel: Channel, payload: &[u8]) -> DfuResult<()>;

    /// Write with response (control point requests).
    ///
    /// The acknowledgement is the GATT write response only. The protocol
    /// answer arrives later as a notification, possibly before this returns.
    fn write_request(&mut self, channel: Channel, payload: &[u8]) -> DfuResult<()>;

    /// Subscribe to notifications on `channel`.
    ///
    /// Every notification must be forwarded with [`DfuNotifier::notify`],
    /// from whichever thread the BLE stack delivers it on.
    fn subscribe(&mut self, channel: Channel, notifier: DfuNotifier) -> DfuResult<()>;
}
