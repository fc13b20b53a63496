//! In-memory Secure DFU peripheral.
//!
//! Answers control point requests the way a bootloader does, keeps the
//! received objects, and records every write for assertions.

use std::thread;
use std::time::Duration;

use crate::dfu::{crc32, BleTransport, Channel, DfuError, DfuNotifier, DfuResult};

const RESPONSE_CODE: u8 = 0x60;
const RESULT_SUCCESS: u8 = 0x01;
const RESULT_OP_CODE_NOT_SUPPORTED: u8 = 0x02;
const RESULT_OPERATION_FAILED: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selected {
    Command,
    Data,
}

pub struct SimulatedPeripheral {
    notifier: Option<DfuNotifier>,
    selected: Option<Selected>,
    command_object: Vec<u8>,
    firmware: Vec<u8>,
    checksum_requests: usize,
    reset: bool,

    respond_from_thread: bool,
    corrupt_checksum: Option<usize>,
    fail_opcode: Option<u8>,
    ignore_opcode: Option<u8>,

    /// Every control point request, in order.
    pub requests: Vec<Vec<u8>>,
    /// Length of every packet write, in order.
    pub packet_writes: Vec<usize>,
    pub subscriptions: Vec<Channel>,
}

impl SimulatedPeripheral {
    pub fn new() -> Self {
        Self {
            notifier: None,
            selected: None,
            command_object: Vec::new(),
            firmware: Vec::new(),
            checksum_requests: 0,
            reset: false,
            respond_from_thread: false,
            corrupt_checksum: None,
            fail_opcode: None,
            ignore_opcode: None,
            requests: Vec::new(),
            packet_writes: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Deliver notifications from a separate thread after a short delay.
    pub fn respond_from_thread(mut self) -> Self {
        self.respond_from_thread = true;
        self
    }

    /// Report a wrong CRC in the `nth` checksum response (zero based).
    pub fn corrupt_checksum(mut self, nth: usize) -> Self {
        self.corrupt_checksum = Some(nth);
        self
    }

    /// Answer `opcode` with an operation failed result.
    pub fn fail_opcode(mut self, opcode: u8) -> Self {
        self.fail_opcode = Some(opcode);
        self
    }

    /// Never answer `opcode`.
    pub fn ignore_opcode(mut self, opcode: u8) -> Self {
        self.ignore_opcode = Some(opcode);
        self
    }

    /// Firmware bytes received over the packet channel.
    pub fn received_firmware(&self) -> &[u8] {
        &self.firmware
    }

    /// Whether the final execute activated the image.
    pub fn has_reset(&self) -> bool {
        self.reset
    }

    fn handle_request(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let opcode = *request.first()?;

        if self.ignore_opcode == Some(opcode) {
            return None;
        }
        if self.fail_opcode == Some(opcode) {
            return Some(vec![RESPONSE_CODE, opcode, RESULT_OPERATION_FAILED]);
        }

        match opcode {
            // Set PRN
            0x02 => Some(vec![RESPONSE_CODE, opcode, RESULT_SUCCESS]),
            // Create
            0x01 => {
                match request.get(1) {
                    Some(0x01) => {
                        self.selected = Some(Selected::Command);
                        self.command_object.clear();
                    }
                    Some(0x02) => self.selected = Some(Selected::Data),
                    _ => return Some(vec![RESPONSE_CODE, opcode, 0x03]),
                }
                Some(vec![RESPONSE_CODE, opcode, RESULT_SUCCESS])
            }
            // Calculate checksum
            0x03 => {
                let received = match self.selected {
                    Some(Selected::Command) => &self.command_object,
                    _ => &self.firmware,
                };
                let offset = received.len() as u32;
                let mut crc = crc32(received);
                if self.corrupt_checksum == Some(self.checksum_requests) {
                    crc ^= 0xDEAD_BEEF;
                }
                self.checksum_requests += 1;

                let mut response = vec![RESPONSE_CODE, opcode, RESULT_SUCCESS];
                response.extend_from_slice(&offset.to_le_bytes());
                response.extend_from_slice(&crc.to_le_bytes());
                Some(response)
            }
            // Execute
            0x04 => {
                // A second execute right after a committed data object
                // activates the image and the device resets without answering
                let previous = self
                    .requests
                    .len()
                    .checked_sub(2)
                    .and_then(|index| self.requests[index].first().copied());
                if self.selected == Some(Selected::Data) && previous == Some(0x04) {
                    self.reset = true;
                    return None;
                }
                Some(vec![RESPONSE_CODE, opcode, RESULT_SUCCESS])
            }
            _ => Some(vec![RESPONSE_CODE, opcode, RESULT_OP_CODE_NOT_SUPPORTED]),
        }
    }

    fn deliver(&self, response: Vec<u8>) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let service = Channel::ControlPoint.service_uuid();
        let characteristic = Channel::ControlPoint.characteristic_uuid();

        if self.respond_from_thread {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(2));
                notifier.notify(service, characteristic, &response);
            });
        } else {
            notifier.notify(service, characteristic, &response);
        }
    }
}

impl Default for SimulatedPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport for SimulatedPeripheral {
    fn write_command(&mut self, channel: Channel, payload: &[u8]) -> DfuResult<()> {
        if channel != Channel::Packet {
            return Err(DfuError::transport("write_command", "not a packet write"));
        }
        self.packet_writes.push(payload.len());
        match self.selected {
            Some(Selected::Command) => self.command_object.extend_from_slice(payload),
            Some(Selected::Data) => self.firmware.extend_from_slice(payload),
            None => return Err(DfuError::transport("write_command", "no object selected")),
        }
        Ok(())
    }

    fn write_request(&mut self, channel: Channel, payload: &[u8]) -> DfuResult<()> {
        if channel != Channel::ControlPoint {
            return Err(DfuError::transport("write_request", "not a control point write"));
        }
        self.requests.push(payload.to_vec());
        if let Some(response) = self.handle_request(payload) {
            self.deliver(response);
        }
        Ok(())
    }

    fn subscribe(&mut self, channel: Channel, notifier: DfuNotifier) -> DfuResult<()> {
        self.subscriptions.push(channel);
        self.notifier = Some(notifier);
        Ok(())
    }
}
