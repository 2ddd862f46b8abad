//! Inbound cloud-to-device message dispatch (§4.7): resolves a handler
//! (default or input-named), invokes it, and forwards the resulting
//! disposition to the transport.

use crate::transport::{CloudToDeviceMessage, Disposition};

/// The three coexisting callback shapes for one slot, collapsed into a
/// tagged variant so "at most one shape is active" is a type-level
/// invariant rather than something checked at runtime (§9's "Polymorphism
/// over callback shapes").
pub enum MessageCallback {
    None,
    Sync(Box<dyn FnMut(&CloudToDeviceMessage) -> Disposition>),
    AsyncExtended(Box<dyn FnMut(&CloudToDeviceMessage) -> bool>),
}

impl Default for MessageCallback {
    fn default() -> Self {
        MessageCallback::None
    }
}

impl MessageCallback {
    pub fn is_set(&self) -> bool {
        !matches!(self, MessageCallback::None)
    }

    /// Invoke the registered handler. Returns `None` if no handler is
    /// registered (the caller should report that upward as "not handled",
    /// which causes the transport to re-queue/NACK per §4.7). The sync
    /// variant's disposition is converted to the same boolean shape the
    /// async-extended variant returns, so the message dispatcher can treat
    /// both uniformly.
    pub fn dispatch(&mut self, message: &CloudToDeviceMessage) -> Option<(bool, Option<Disposition>)> {
        match self {
            MessageCallback::None => None,
            MessageCallback::Sync(handler) => {
                let disposition = handler(message);
                Some((true, Some(disposition)))
            }
            MessageCallback::AsyncExtended(handler) => {
                let accepted = handler(message);
                Some((accepted, None))
            }
        }
    }
}

/// Resolve and invoke a handler for an inbound message, given the default
/// route's callback and (for named-input delivery) whatever the input-route
/// registry resolved. Returns `false` when nothing handled it.
pub fn dispatch_message(
    default: &mut MessageCallback,
    resolved: Option<&mut MessageCallback>,
    message: &CloudToDeviceMessage,
) -> (bool, Option<Disposition>) {
    let handler = resolved.filter(|cb| cb.is_set()).unwrap_or(default);
    match handler.dispatch(message) {
        Some((accepted, disposition)) => (accepted, disposition),
        None => (false, None),
    }
}
