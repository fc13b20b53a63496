//! Secure DFU protocol state machine.
//!
//! Orchestrates a complete Secure DFU transfer over the control point and
//! packet characteristics:
//! 1. Set PRN - Disable packet receipt notifications
//! 2. Init packet - Create, write, verify and execute the command object
//! 3. Firmware - Per flash page: create, write chunks, verify, execute
//! 4. Final execute - The device resets into the new image without answering
//!
//! Each step performs the current state's action, waits for the control
//! point response if the state expects one, and moves to the next state.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::chunker::{plan_object, ChunkPlan};
use super::config::{describe_result, ObjectType, PACKET_RECEIPT_NOTIFICATION_COUNT};
use super::crc::{crc32, Crc32};
use super::error::{DfuError, DfuResult};
use super::firmware_reader::read_firmware_zip;
use super::packet::{
    build_checksum_request, build_create_request, build_execute_request, build_set_prn_request,
};
use super::rendezvous::{DfuNotifier, ResponseInbox};
use super::response::{DecodedNotification, Event, Response};
use super::settings::DfuSettings;
use super::transport::{BleTransport, Channel};

/// States of a DFU session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfuState {
    Idle,
    SetNotifValue,
    DatafileCreate,
    DatafileWrite,
    DatafileChecksum,
    DatafileExecute,
    BinfileCreate,
    BinfileWriteChunks,
    BinfileChecksum,
    BinfileExecute,
    BinfileExecuteFinal,
    Finished,
    /// An unexpected event for the state, or a transport failure.
    Error,
    /// Local and device CRC disagree: the payload was corrupted in transit.
    ErrorChecksum,
}

/// Inputs to a transition besides the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionContext {
    /// CRC computed locally over everything written for the current payload.
    pub local_crc: u32,
    /// CRC reported by the device in the response being handled.
    pub reported_crc: Option<u32>,
    /// The object in flight is the last one of the image.
    pub final_object: bool,
}

impl DfuState {
    /// Whether this state's action is answered on the control point.
    pub fn awaits_response(&self) -> bool {
        matches!(
            self,
            DfuState::SetNotifValue
                | DfuState::DatafileCreate
                | DfuState::DatafileChecksum
                | DfuState::DatafileExecute
                | DfuState::BinfileCreate
                | DfuState::BinfileChecksum
                | DfuState::BinfileExecute
        )
    }

    /// Whether the session has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DfuState::Finished | DfuState::Error | DfuState::ErrorChecksum
        )
    }

    /// Next state after handling `event` in this state.
    pub fn next(self, event: Event, context: &TransitionContext) -> DfuState {
        let accept = |expected: Event, then: DfuState| {
            if event == expected {
                then
            } else {
                DfuState::Error
            }
        };
        let verify = |then: DfuState| {
            if event != Event::ChecksumReceived {
                DfuState::Error
            } else if context.reported_crc == Some(context.local_crc) {
                then
            } else {
                DfuState::ErrorChecksum
            }
        };

        match self {
            DfuState::Idle => DfuState::SetNotifValue,
            DfuState::SetNotifValue => accept(
                Event::PacketReceiptNotificationSuccess,
                DfuState::DatafileCreate,
            ),
            DfuState::DatafileCreate => accept(Event::CreateSuccess, DfuState::DatafileWrite),
            DfuState::DatafileWrite => DfuState::DatafileChecksum,
            DfuState::DatafileChecksum => verify(DfuState::DatafileExecute),
            DfuState::DatafileExecute => accept(Event::ExecuteSuccess, DfuState::BinfileCreate),
            DfuState::BinfileCreate => accept(Event::CreateSuccess, DfuState::BinfileWriteChunks),
            DfuState::BinfileWriteChunks => DfuState::BinfileChecksum,
            DfuState::BinfileChecksum => verify(DfuState::BinfileExecute),
            DfuState::BinfileExecute => {
                let then = if context.final_object {
                    DfuState::BinfileExecuteFinal
                } else {
                    DfuState::BinfileCreate
                };
                accept(Event::ExecuteSuccess, then)
            }
            DfuState::BinfileExecuteFinal => accept(Event::ExecuteSuccess, DfuState::Finished),
            DfuState::Finished | DfuState::Error | DfuState::ErrorChecksum => self,
        }
    }
}

/// DFU progress stages for UI feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data")]
pub enum DfuStage {
    /// Reading firmware package.
    ReadingPackage,
    /// Session started.
    Starting,
    /// Sending init packet.
    SendingInit,
    /// Creating a data object on the device.
    CreatingObject { index: usize, size: usize },
    /// Uploading firmware data.
    Uploading { sent: usize, total: usize },
    /// Comparing checksums with the device.
    Verifying,
    /// Committing the current object.
    Executing,
    /// Final execute sent, device is resetting.
    Finalizing,
    /// DFU process complete.
    Complete,
    /// Session ended in an error state.
    Failed { state: DfuState },
    /// Debug log message.
    Log { message: String },
}

impl DfuStage {
    /// Get a percentage estimate for this stage.
    ///
    /// Stages that repeat per object do not move the estimate and return -1.
    pub fn percent(&self) -> f32 {
        match self {
            DfuStage::ReadingPackage => 0.0,
            DfuStage::Starting => 2.0,
            DfuStage::SendingInit => 5.0,
            DfuStage::Uploading { sent, total } => {
                if *total == 0 {
                    10.0
                } else {
                    10.0 + (*sent as f32 / *total as f32) * 85.0
                }
            }
            DfuStage::Finalizing => 97.0,
            DfuStage::Complete => 100.0,
            DfuStage::CreatingObject { .. }
            | DfuStage::Verifying
            | DfuStage::Executing
            | DfuStage::Failed { .. }
            | DfuStage::Log { .. } => -1.0,
        }
    }

    /// Get a human-readable message for this stage.
    pub fn message(&self) -> String {
        match self {
            DfuStage::ReadingPackage => "Reading firmware package...".into(),
            DfuStage::Starting => "Starting DFU session...".into(),
            DfuStage::SendingInit => "Sending initialization data...".into(),
            DfuStage::CreatingObject { index, size } => {
                format!("Creating data object {} ({} bytes)...", index, size)
            }
            DfuStage::Uploading { sent, total } => {
                let percent = if *total == 0 {
                    0
                } else {
                    (sent * 100) / total
                };
                format!("Uploading firmware... {}%", percent)
            }
            DfuStage::Verifying => "Verifying checksum...".into(),
            DfuStage::Executing => "Executing object...".into(),
            DfuStage::Finalizing => "Activating new firmware...".into(),
            DfuStage::Complete => "Update complete!".into(),
            DfuStage::Failed { state } => format!("Update failed in state {:?}", state),
            DfuStage::Log { message } => message.clone(),
        }
    }
}

type ProgressFn = Box<dyn Fn(DfuStage) + Send>;

/// One DFU run against one device.
///
/// The session owns both payloads and the transport. The transport's
/// notification path only touches the shared inbox through [`DfuNotifier`].
pub struct DfuSession<T: BleTransport> {
    transport: T,
    init_data: Vec<u8>,
    firmware_data: Vec<u8>,
    settings: DfuSettings,
    state: DfuState,
    bin_bytes_written: usize,
    current_object: Option<ChunkPlan>,
    objects_sent: usize,
    local_crc: u32,
    /// Running CRC over the image bytes placed in data objects so far.
    image_crc: Crc32,
    last_event: Event,
    last_response: Option<Response>,
    inbox: Arc<ResponseInbox>,
    progress: Option<ProgressFn>,
}

impl<T: BleTransport> DfuSession<T> {
    /// Create a session and subscribe to control point notifications.
    ///
    /// Both payloads must be non-empty and fit the protocol's 32-bit sizes.
    pub fn new(
        mut transport: T,
        init_data: Vec<u8>,
        firmware_data: Vec<u8>,
        settings: DfuSettings,
    ) -> DfuResult<Self> {
        settings.validate()?;
        check_payload("init", &init_data)?;
        check_payload("firmware", &firmware_data)?;

        let inbox = Arc::new(ResponseInbox::new());
        transport.subscribe(Channel::ControlPoint, DfuNotifier::new(Arc::clone(&inbox)))?;

        Ok(Self {
            transport,
            init_data,
            firmware_data,
            settings,
            state: DfuState::Idle,
            bin_bytes_written: 0,
            current_object: None,
            objects_sent: 0,
            local_crc: 0,
            image_crc: Crc32::new(),
            last_event: Event::NoEvent,
            last_response: None,
            inbox,
            progress: None,
        })
    }

    /// Report progress through `on_progress`.
    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(DfuStage) + Send + 'static,
    {
        self.progress = Some(Box::new(on_progress));
        self
    }

    /// A handle for delivering notifications to this session.
    pub fn notifier(&self) -> DfuNotifier {
        DfuNotifier::new(Arc::clone(&self.inbox))
    }

    pub fn state(&self) -> DfuState {
        self.state
    }

    /// Firmware bytes streamed to the device so far.
    pub fn bytes_written(&self) -> usize {
        self.bin_bytes_written
    }

    pub fn firmware_len(&self) -> usize {
        self.firmware_data.len()
    }

    pub fn last_event(&self) -> Event {
        self.last_event
    }

    pub fn last_response(&self) -> Option<Response> {
        self.last_response
    }

    /// CRC the next checksum response is compared against.
    pub fn local_crc(&self) -> u32 {
        self.local_crc
    }

    /// Plan of the data object in flight.
    pub fn current_object(&self) -> Option<ChunkPlan> {
        self.current_object
    }

    /// Number of data objects created so far.
    pub fn objects_sent(&self) -> usize {
        self.objects_sent
    }

    pub fn settings(&self) -> &DfuSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run the session until it reaches a terminal state.
    pub fn run(&mut self) -> DfuResult<DfuState> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(self.state)
    }

    /// Perform one state's action and transition.
    ///
    /// A transport failure or response timeout moves the session to
    /// [`DfuState::Error`] and is returned as the error.
    pub fn step(&mut self) -> DfuResult<DfuState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }

        let awaited = match self.perform_action() {
            Ok(awaited) => awaited,
            Err(err) => return Err(self.abort(err)),
        };

        let decoded = if awaited {
            match self.inbox.wait(self.settings.response_timeout()) {
                Some(decoded) => decoded,
                None => {
                    let err = DfuError::Timeout { state: self.state };
                    return Err(self.abort(err));
                }
            }
        } else {
            self.inbox.latest()
        };

        self.last_event = decoded.event;
        if decoded.response.is_some() {
            self.last_response = decoded.response;
        }

        let context = TransitionContext {
            local_crc: self.local_crc,
            reported_crc: decoded.response.and_then(|r| r.reported_crc()),
            final_object: self.current_object.is_some_and(|p| p.is_final_object),
        };
        let next = self.state.next(decoded.event, &context);
        self.report_transition(next, &decoded, &context);
        self.state = next;

        Ok(next)
    }

    /// Carry out the current state's action. Returns whether a response is awaited.
    fn perform_action(&mut self) -> DfuResult<bool> {
        match self.state {
            DfuState::Idle => {
                self.emit(DfuStage::Starting);
                Ok(false)
            }
            DfuState::SetNotifValue => {
                self.send_control(build_set_prn_request(PACKET_RECEIPT_NOTIFICATION_COUNT), true)
            }
            DfuState::DatafileCreate => {
                self.emit(DfuStage::SendingInit);
                let size = self.init_data.len() as u32;
                self.send_control(build_create_request(ObjectType::Command, size), true)
            }
            DfuState::DatafileWrite => {
                self.local_crc = crc32(&self.init_data);
                log::trace!("Init packet ({} bytes) -> packet", self.init_data.len());
                self.transport.write_command(Channel::Packet, &self.init_data)?;
                Ok(false)
            }
            DfuState::DatafileChecksum | DfuState::BinfileChecksum => {
                self.emit(DfuStage::Verifying);
                self.send_control(build_checksum_request(), true)
            }
            DfuState::DatafileExecute | DfuState::BinfileExecute => {
                self.emit(DfuStage::Executing);
                self.send_control(build_execute_request(), true)
            }
            DfuState::BinfileCreate => self.create_data_object(),
            DfuState::BinfileWriteChunks => self.write_chunks(),
            DfuState::BinfileExecuteFinal => {
                // The device resets to apply the image and never answers
                self.emit(DfuStage::Finalizing);
                self.send_control(build_execute_request(), false)
            }
            DfuState::Finished | DfuState::Error | DfuState::ErrorChecksum => Ok(false),
        }
    }

    /// Write a control point request, arming the inbox first if it is answered.
    fn send_control(&mut self, request: Vec<u8>, await_response: bool) -> DfuResult<bool> {
        if await_response {
            self.inbox.arm();
        }
        log::trace!("{:02X?} -> control point", request);
        self.transport.write_request(Channel::ControlPoint, &request)?;
        Ok(await_response)
    }

    fn create_data_object(&mut self) -> DfuResult<bool> {
        let plan = plan_object(
            self.firmware_data.len(),
            self.bin_bytes_written,
            self.settings.flash_page_size,
            self.settings.chunk_size,
        );
        let Some(plan) = plan else {
            log::error!("No firmware bytes left for a new data object");
            self.current_object = None;
            return Ok(false);
        };

        // The device checksums everything received for the image, not just this object
        self.image_crc.update(&self.firmware_data[plan.offset..plan.end()]);
        self.local_crc = self.image_crc.finalize();
        self.current_object = Some(plan);
        self.objects_sent += 1;

        log::debug!(
            "Data object {}: {} bytes at offset {}{}",
            self.objects_sent,
            plan.object_size,
            plan.offset,
            if plan.is_final_object { " (final)" } else { "" }
        );
        self.emit(DfuStage::CreatingObject {
            index: self.objects_sent,
            size: plan.object_size,
        });

        let size = plan.object_size as u32;
        self.send_control(build_create_request(ObjectType::Data, size), true)
    }

    fn write_chunks(&mut self) -> DfuResult<bool> {
        let Some(plan) = self.current_object else {
            return Ok(false);
        };
        let total = self.firmware_data.len();

        for range in plan.chunks() {
            let sent = range.end;
            self.transport.write_command(Channel::Packet, &self.firmware_data[range])?;
            self.emit(DfuStage::Uploading { sent, total });
        }

        self.bin_bytes_written += plan.object_size;
        Ok(false)
    }

    /// Enter the error state after a failure outside the protocol.
    fn abort(&mut self, err: DfuError) -> DfuError {
        log::error!("DFU aborted in state {:?}: {}", self.state, err);
        self.inbox.disarm();
        self.state = DfuState::Error;
        self.emit(DfuStage::Log {
            message: format!("[{}] {}", err.error_code(), err),
        });
        self.emit(DfuStage::Failed {
            state: DfuState::Error,
        });
        err
    }

    fn report_transition(
        &self,
        next: DfuState,
        decoded: &DecodedNotification,
        context: &TransitionContext,
    ) {
        log::debug!("{:?} --{:?}--> {:?}", self.state, decoded.event, next);

        match next {
            DfuState::Finished => {
                log::info!(
                    "DFU complete: {} bytes in {} objects",
                    self.bin_bytes_written,
                    self.objects_sent
                );
                self.emit(DfuStage::Complete);
            }
            DfuState::ErrorChecksum => {
                let message = format!(
                    "Checksum mismatch in {:?}: local 0x{:08X}, device {}",
                    self.state,
                    context.local_crc,
                    context
                        .reported_crc
                        .map_or_else(|| "none".to_string(), |crc| format!("0x{:08X}", crc))
                );
                log::warn!("{}", message);
                self.emit(DfuStage::Log { message });
                self.emit(DfuStage::Failed { state: next });
            }
            DfuState::Error => {
                let message = match (decoded.event, decoded.response) {
                    (Event::ErrorReceived, Some(response)) => format!(
                        "Device rejected opcode 0x{:02X} in {:?}: {}",
                        response.request_opcode,
                        self.state,
                        describe_result(response.result_code)
                    ),
                    (event, _) => format!("Unexpected {:?} in {:?}", event, self.state),
                };
                log::error!("{}", message);
                self.emit(DfuStage::Log { message });
                self.emit(DfuStage::Failed { state: next });
            }
            _ => {}
        }
    }

    fn emit(&self, stage: DfuStage) {
        if let Some(on_progress) = &self.progress {
            on_progress(stage);
        }
    }
}

fn check_payload(name: &'static str, data: &[u8]) -> DfuResult<()> {
    if data.is_empty() {
        return Err(DfuError::EmptyPayload { name });
    }
    if u32::try_from(data.len()).is_err() {
        return Err(DfuError::PayloadTooLarge {
            name,
            size: data.len(),
        });
    }
    Ok(())
}

/// Run a session on tokio's blocking pool and resolve with its final state.
///
/// `Ok` carries the terminal state. A [`DfuError::Timeout`] or
/// [`DfuError::Transport`] means the session stopped in [`DfuState::Error`];
/// the timeout names the state that was waiting.
pub async fn run_session_async<T>(mut session: DfuSession<T>) -> DfuResult<DfuState>
where
    T: BleTransport + 'static,
{
    tokio::task::spawn_blocking(move || session.run())
        .await
        .map_err(|e| DfuError::TaskFailed {
            reason: e.to_string(),
        })?
}

/// Upload the application image of a DFU package.
///
/// # Arguments
/// * `transport` - Connected transport to a device in DFU mode
/// * `firmware_zip_path` - Path to the DFU zip package
/// * `settings` - Transfer settings
/// * `on_progress` - Callback for progress updates
///
/// # Returns
/// The terminal state the session reached
pub fn upload_firmware<T, P, F>(
    transport: T,
    firmware_zip_path: P,
    settings: DfuSettings,
    on_progress: F,
) -> DfuResult<DfuState>
where
    T: BleTransport,
    P: AsRef<Path>,
    F: Fn(DfuStage) + Send + 'static,
{
    on_progress(DfuStage::ReadingPackage);
    let package = read_firmware_zip(firmware_zip_path.as_ref())?;
    log::info!(
        "Uploading {} from {}",
        package.manifest.image,
        firmware_zip_path.as_ref().display()
    );

    on_progress(DfuStage::Log {
        message: format!(
            "Init packet {} bytes, firmware {} bytes",
            package.init_data.len(),
            package.firmware_data.len()
        ),
    });

    let mut session = DfuSession::new(
        transport,
        package.init_data,
        package.firmware_data,
        settings,
    )?
    .with_progress(on_progress);

    session.run()
}
