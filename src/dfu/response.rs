//! Control point response decoding.
//!
//! Every notification on the control point is reduced to an [`Event`] the
//! state machine consumes, plus the decoded [`Response`] when the bytes had
//! one. Malformed input is reported as an event, never as an error.

use serde::{Deserialize, Serialize};

use super::config::{
    DfuOpcode, ResultCode, RESPONSE_HEADER_LEN, RESPONSE_LEN_CHECKSUM, RESPONSE_LEN_SELECT,
};
use super::transport::Channel;

/// Outcome of decoding one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Checksum response with offset and CRC.
    ChecksumReceived,
    /// Select response with max size, offset and CRC.
    SelectObjectReceived,
    CreateSuccess,
    PacketReceiptNotificationSuccess,
    ExecuteSuccess,
    ResponseCodeSuccess,
    /// Nothing has been decoded for the current exchange.
    NoEvent,
    /// Value bytes do not match what the echoed opcode carries.
    ErrorInvalidLength,
    /// The device reported a non-success result code.
    ErrorReceived,
    /// Success reported for an opcode this driver never expects.
    ErrorUnknownOpcode,
    /// Data did not start with the response code marker.
    ErrorNoResponsePrefix,
    /// Data arrived on a service/characteristic other than the control point.
    ErrorNotSupportedChannel,
}

impl Event {
    /// Every event value.
    pub const ALL: [Event; 12] = [
        Event::ChecksumReceived,
        Event::SelectObjectReceived,
        Event::CreateSuccess,
        Event::PacketReceiptNotificationSuccess,
        Event::ExecuteSuccess,
        Event::ResponseCodeSuccess,
        Event::NoEvent,
        Event::ErrorInvalidLength,
        Event::ErrorReceived,
        Event::ErrorUnknownOpcode,
        Event::ErrorNoResponsePrefix,
        Event::ErrorNotSupportedChannel,
    ];

    /// Framing anomalies describe the notification, not the device's answer.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Event::ErrorNoResponsePrefix | Event::ErrorNotSupportedChannel
        )
    }
}

/// Typed response value, selected by the echoed opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseValue {
    Checksum { offset: u32, crc32: u32 },
    Select { max_size: u32, offset: u32, crc32: u32 },
    None,
}

/// A decoded control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// The opcode of the request this answers.
    pub request_opcode: u8,
    /// Raw result code.
    pub result_code: u8,
    pub value: ResponseValue,
}

impl Response {
    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success as u8
    }

    /// CRC reported by the device, if this response carries one.
    pub fn reported_crc(&self) -> Option<u32> {
        match self.value {
            ResponseValue::Checksum { crc32, .. } | ResponseValue::Select { crc32, .. } => {
                Some(crc32)
            }
            ResponseValue::None => None,
        }
    }

    /// Offset reported by the device, if this response carries one.
    pub fn reported_offset(&self) -> Option<u32> {
        match self.value {
            ResponseValue::Checksum { offset, .. } | ResponseValue::Select { offset, .. } => {
                Some(offset)
            }
            ResponseValue::None => None,
        }
    }
}

/// Event and response produced by decoding one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedNotification {
    pub event: Event,
    pub response: Option<Response>,
}

impl DecodedNotification {
    fn event_only(event: Event) -> Self {
        Self {
            event,
            response: None,
        }
    }
}

/// Decode a notification, checking the channel it arrived on first.
pub fn decode_notification(
    service: &str,
    characteristic: &str,
    data: &[u8],
) -> DecodedNotification {
    match Channel::from_uuids(service, characteristic) {
        Some(Channel::ControlPoint) => decode_response(data),
        _ => DecodedNotification::event_only(Event::ErrorNotSupportedChannel),
    }
}

/// Decode raw control point response bytes.
///
/// Layout: `[0x60][request_opcode][result_code][value...]`.
pub fn decode_response(data: &[u8]) -> DecodedNotification {
    if data.first() != Some(&(DfuOpcode::ResponseCode as u8)) {
        return DecodedNotification::event_only(Event::ErrorNoResponsePrefix);
    }
    if data.len() < RESPONSE_HEADER_LEN {
        return DecodedNotification::event_only(Event::ErrorInvalidLength);
    }

    let request_opcode = data[1];
    let result_code = data[2];
    let value_bytes = &data[RESPONSE_HEADER_LEN..];

    let mut response = Response {
        request_opcode,
        result_code,
        value: ResponseValue::None,
    };

    if !response.is_success() {
        return DecodedNotification {
            event: Event::ErrorReceived,
            response: Some(response),
        };
    }

    let event = match DfuOpcode::from_byte(request_opcode) {
        Some(DfuOpcode::CalculateChecksum) => match read_le_u32s::<2>(value_bytes) {
            Some([offset, crc32]) if value_bytes.len() == RESPONSE_LEN_CHECKSUM => {
                response.value = ResponseValue::Checksum { offset, crc32 };
                Event::ChecksumReceived
            }
            _ => Event::ErrorInvalidLength,
        },
        Some(DfuOpcode::SelectObject) => match read_le_u32s::<3>(value_bytes) {
            Some([max_size, offset, crc32]) if value_bytes.len() == RESPONSE_LEN_SELECT => {
                response.value = ResponseValue::Select {
                    max_size,
                    offset,
                    crc32,
                };
                Event::SelectObjectReceived
            }
            _ => Event::ErrorInvalidLength,
        },
        Some(opcode) => match value_less_event(opcode) {
            Some(_) if !value_bytes.is_empty() => Event::ErrorInvalidLength,
            Some(event) => event,
            None => Event::ErrorUnknownOpcode,
        },
        None => Event::ErrorUnknownOpcode,
    };

    DecodedNotification {
        event,
        response: Some(response),
    }
}

/// Success event for opcodes whose response carries no value.
fn value_less_event(opcode: DfuOpcode) -> Option<Event> {
    match opcode {
        DfuOpcode::Create => Some(Event::CreateSuccess),
        DfuOpcode::SetPacketReceiptNotification => Some(Event::PacketReceiptNotificationSuccess),
        DfuOpcode::Execute => Some(Event::ExecuteSuccess),
        DfuOpcode::ResponseCode => Some(Event::ResponseCodeSuccess),
        _ => None,
    }
}

/// Read `N` consecutive little-endian u32 fields from the start of `bytes`.
fn read_le_u32s<const N: usize>(bytes: &[u8]) -> Option<[u32; N]> {
    if bytes.len() < N * 4 {
        return None;
    }
    let mut fields = [0u32; N];
    for (field, raw) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
        *field = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    }
    Some(fields)
}
