//! Rendezvous between the session driver and the notification context.
//!
//! A single-slot inbox guarded by one mutex. The driver arms it before
//! issuing a request that expects an answer, then blocks on the condition
//! variable. The notification side decodes, fills the slot and releases the
//! driver. Arming always happens before the write: a response can arrive
//! before the transport's write call returns.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::response::{decode_notification, DecodedNotification, Event, Response};

#[derive(Debug)]
struct Slot {
    awaiting: bool,
    event: Event,
    response: Option<Response>,
}

/// Shared inbox holding the latest decoded notification.
#[derive(Debug)]
pub(crate) struct ResponseInbox {
    slot: Mutex<Slot>,
    signal: Condvar,
}

impl ResponseInbox {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                awaiting: false,
                event: Event::NoEvent,
                response: None,
            }),
            signal: Condvar::new(),
        }
    }

    // Slot fields are plain values, a panic elsewhere cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expect a response: clear the slot and mark the driver as waiting.
    pub(crate) fn arm(&self) {
        let mut slot = self.lock();
        slot.awaiting = true;
        slot.event = Event::NoEvent;
        slot.response = None;
    }

    /// Stop expecting a response (the armed write failed).
    pub(crate) fn disarm(&self) {
        self.lock().awaiting = false;
    }

    /// Block until the armed exchange is answered.
    ///
    /// `None` waits indefinitely. Returns `None` if the timeout elapsed first.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<DecodedNotification> {
        let guard = self.lock();
        let mut slot = match timeout {
            None => self
                .signal
                .wait_while(guard, |slot| slot.awaiting)
                .unwrap_or_else(PoisonError::into_inner),
            Some(limit) => {
                let (slot, result) = self
                    .signal
                    .wait_timeout_while(guard, limit, |slot| slot.awaiting)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && slot.awaiting {
                    return None;
                }
                slot
            }
        };
        slot.awaiting = false;
        Some(DecodedNotification {
            event: slot.event,
            response: slot.response,
        })
    }

    /// The most recent notification, without waiting or clearing it.
    pub(crate) fn latest(&self) -> DecodedNotification {
        let slot = self.lock();
        DecodedNotification {
            event: slot.event,
            response: slot.response,
        }
    }

    fn deliver(&self, decoded: DecodedNotification) {
        let mut slot = self.lock();
        slot.event = decoded.event;
        // A notification that is not a response leaves the waiter armed;
        // a later valid response replaces the recorded anomaly.
        if decoded.event.is_framing_error() {
            return;
        }
        slot.response = decoded.response;
        slot.awaiting = false;
        self.signal.notify_all();
    }
}

/// Handle given to the transport for delivering control point notifications.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct DfuNotifier {
    inbox: Arc<ResponseInbox>,
}

impl DfuNotifier {
    pub(crate) fn new(inbox: Arc<ResponseInbox>) -> Self {
        Self { inbox }
    }

    /// Deliver raw notification bytes received on `service`/`characteristic`.
    pub fn notify(&self, service: &str, characteristic: &str, data: &[u8]) {
        let decoded = decode_notification(service, characteristic, data);
        log::trace!(
            "Notification ({} bytes) decoded as {:?}",
            data.len(),
            decoded.event
        );
        self.inbox.deliver(decoded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfu::config::{CONTROL_POINT_CHAR_UUID, PACKET_CHAR_UUID, SECURE_DFU_SERVICE_UUID};
    use std::thread;

    fn notifier_pair() -> (Arc<ResponseInbox>, DfuNotifier) {
        let inbox = Arc::new(ResponseInbox::new());
        let notifier = DfuNotifier::new(Arc::clone(&inbox));
        (inbox, notifier)
    }

    fn notify_control_point(notifier: &DfuNotifier, data: &[u8]) {
        notifier.notify(SECURE_DFU_SERVICE_UUID, CONTROL_POINT_CHAR_UUID, data);
    }

    #[test]
    fn test_response_before_wait_is_not_lost() {
        let (inbox, notifier) = notifier_pair();

        // Armed first, answered before the driver starts waiting
        inbox.arm();
        notify_control_point(&notifier, &[0x60, 0x01, 0x01]);

        let decoded = inbox.wait(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(decoded.event, Event::CreateSuccess);
    }

    #[test]
    fn test_response_from_other_thread() {
        let (inbox, notifier) = notifier_pair();
        inbox.arm();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notify_control_point(&notifier, &[0x60, 0x04, 0x01]);
        });

        let decoded = inbox.wait(None).unwrap();
        assert_eq!(decoded.event, Event::ExecuteSuccess);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let (inbox, _notifier) = notifier_pair();
        inbox.arm();
        assert!(inbox.wait(Some(Duration::from_millis(20))).is_none());
    }

    #[test]
    fn test_arm_clears_previous_response() {
        let (inbox, notifier) = notifier_pair();
        inbox.arm();
        notify_control_point(&notifier, &[0x60, 0x04, 0x01]);
        assert_eq!(inbox.latest().event, Event::ExecuteSuccess);

        inbox.arm();
        let latest = inbox.latest();
        assert_eq!(latest.event, Event::NoEvent);
        assert!(latest.response.is_none());
    }

    #[test]
    fn test_framing_error_keeps_driver_waiting() {
        let (inbox, notifier) = notifier_pair();
        inbox.arm();

        notifier.notify(SECURE_DFU_SERVICE_UUID, PACKET_CHAR_UUID, &[0x60, 0x01, 0x01]);
        assert_eq!(inbox.latest().event, Event::ErrorNotSupportedChannel);
        assert!(inbox.wait(Some(Duration::from_millis(10))).is_none());

        notify_control_point(&notifier, &[0x11, 0x00]);
        assert_eq!(inbox.latest().event, Event::ErrorNoResponsePrefix);

        // The real answer still gets through
        notify_control_point(&notifier, &[0x60, 0x02, 0x01]);
        let decoded = inbox.wait(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(decoded.event, Event::PacketReceiptNotificationSuccess);
    }

    #[test]
    fn test_device_failure_releases_driver() {
        let (inbox, notifier) = notifier_pair();
        inbox.arm();
        notify_control_point(&notifier, &[0x60, 0x01, 0x0A]);

        let decoded = inbox.wait(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(decoded.event, Event::ErrorReceived);
        assert_eq!(decoded.response.unwrap().result_code, 0x0A);
    }

    #[test]
    fn test_disarm_releases_wait() {
        let (inbox, _notifier) = notifier_pair();
        inbox.arm();
        inbox.disarm();
        let decoded = inbox.wait(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(decoded.event, Event::NoEvent);
    }
}
