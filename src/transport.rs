//! The wire-protocol transport is an external collaborator (see spec §6):
//! the actual MQTT/AMQP/HTTP plumbing is out of scope for this crate. What's
//! in scope is the contract the client core drives it through, expressed
//! here as the [`Transport`] trait plus the small value types both sides
//! agree on.
//!
//! The reference C implementation this core is modeled on gives the
//! transport direct access to the client's internal linked lists (the
//! transport and the client share memory layout via `TRANSPORT_PROVIDER_FIELDS`).
//! That's not an idiom that survives translation to a trait object, so here
//! the relationship is inverted: the client hands the transport short-lived
//! borrowed views of what it needs (`OutboundMessageRef`, `TwinItemRef`) and
//! the transport reports back a batch of [`TransportEvent`]s on each
//! `do_work` tick instead of calling back into the client directly.

use std::fmt;

use crate::dispatch::method::MethodHandle;

/// A cloud-to-device message as the transport hands it to the dispatcher.
/// The payload is always treated as opaque bytes; the core never parses it.
#[derive(Debug, Clone)]
pub struct CloudToDeviceMessage {
    pub payload: Vec<u8>,
    pub input_name: Option<String>,
    pub properties: Vec<(String, String)>,
}

/// The verdict a user handler (or the disposition API) returns for an
/// inbound cloud-to-device message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Rejected,
    Abandoned,
}

/// Result of handing a batch of outbound messages to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    Ok,
    Error,
    MessageTimeout,
    BecauseDestroy,
}

/// Result of the transport's per-item twin processor for a single pending
/// reported-state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessItemResult {
    Ok,
    Continue,
    NotConnected,
    Error,
}

/// Whether a desired-property delivery is the full twin document or an
/// incremental patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwinUpdateState {
    Complete,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    DisconnectedRetrying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatusReason {
    ConnectionOk,
    ExpiredSasToken,
    DeviceDisabled,
    BadCredential,
    RetryExpired,
    NoNetwork,
    CommunicationError,
    Unauthenticated,
    ProvisioningFailed,
}

/// A borrowed view of an outbound entry the transport may read (payload and
/// properties) in order to actually send it; the transport never mutates or
/// frees it. `id` is the correlation token echoed back in
/// [`TransportEvent::SendBatchComplete`].
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessageRef<'a> {
    pub id: u64,
    pub payload: &'a [u8],
    pub output_name: Option<&'a str>,
}

/// A borrowed view of a twin reported-state entry awaiting processing.
#[derive(Debug, Clone, Copy)]
pub struct TwinItemRef<'a> {
    pub item_id: u32,
    pub payload: &'a [u8],
}

/// A correlation token for an in-flight one-shot `get_twin_async` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GetTwinToken(pub u64);

/// Events the transport reports back on each `do_work` tick. This is the
/// idiomatic-Rust analogue of the callback bundle the spec describes the
/// client registering with the transport (§6): rather than the transport
/// holding function pointers back into the client, the client polls for
/// these after every `do_work` call.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    SendBatchComplete {
        ids: Vec<u64>,
        result: ConfirmationResult,
    },
    TwinReportedStateAck {
        item_id: u32,
        status_code: i32,
    },
    DesiredPropertyUpdate {
        state: TwinUpdateState,
        payload: Vec<u8>,
    },
    GetTwinComplete {
        token: GetTwinToken,
        state: TwinUpdateState,
        payload: Vec<u8>,
    },
    ConnectionStatusChanged {
        status: ConnectionStatus,
        reason: ConnectionStatusReason,
    },
    MessageReceived {
        message: CloudToDeviceMessage,
    },
    MethodInvoked {
        method_name: String,
        payload: Vec<u8>,
        handle: MethodHandle,
    },
}

/// Error surfaced by a single transport operation (subscribe, disposition,
/// set-option, ...). The core treats every variant identically: log and
/// report up as [`crate::error::ClientError::Error`].
#[derive(Debug)]
pub struct TransportError(pub anyhow::Error);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// The wire-protocol vtable (spec §6). A concrete transport (MQTT, AMQP,
/// HTTP, or a test fake) implements this; the client never depends on a
/// specific protocol.
pub trait Transport {
    /// Register the device/module identity with the transport. Called once,
    /// on the REGISTERED → ATTACHED transition (or immediately for clients
    /// created directly from an identity).
    fn register_device(&mut self) -> TransportResult<()>;

    /// Unregister. Called during teardown if the device was registered.
    fn unregister_device(&mut self) -> TransportResult<()>;

    fn subscribe_c2d(&mut self) -> TransportResult<()>;
    fn unsubscribe_c2d(&mut self) -> TransportResult<()>;

    fn subscribe_twin(&mut self) -> TransportResult<()>;
    fn unsubscribe_twin(&mut self) -> TransportResult<()>;

    fn subscribe_method(&mut self) -> TransportResult<()>;
    fn unsubscribe_method(&mut self) -> TransportResult<()>;

    fn subscribe_input_queue(&mut self, input_name: &str) -> TransportResult<()>;
    fn unsubscribe_input_queue(&mut self, input_name: &str) -> TransportResult<()>;

    /// Kick off a one-shot twin retrieval; the result arrives later as
    /// [`TransportEvent::GetTwinComplete`] carrying the same `token`.
    fn get_twin_async(&mut self, token: GetTwinToken) -> TransportResult<()>;

    /// Per-item processor for the twin pending queue (§4.4). Called once per
    /// pending entry, in order, until it returns `Continue`/`NotConnected`.
    fn process_twin_item(&mut self, item: TwinItemRef<'_>) -> ProcessItemResult;

    /// Forward a previously received message's disposition to the cloud.
    fn send_message_disposition(
        &mut self,
        message: &CloudToDeviceMessage,
        disposition: Disposition,
    ) -> TransportResult<()>;

    /// Forward a rendered method response, keyed by the handle the method
    /// dispatch delivered with the original invocation.
    fn device_method_response(
        &mut self,
        handle: MethodHandle,
        response: &[u8],
        status: i32,
    ) -> TransportResult<()>;

    /// String-keyed option forwarding; see §4.8.
    fn set_option(&mut self, name: &str, value: &str) -> TransportResult<()>;

    fn set_retry_policy(&mut self, settings: crate::retry::RetrySettings) -> TransportResult<()>;

    fn hostname(&self) -> &str;

    /// Hand the transport a read-only view of everything currently queued
    /// for send, and let it report back what completed. The client itself
    /// decides when to call this (every `do_work` tick); the transport
    /// should not assume it owns the queue between calls.
    fn send_batch(&mut self, outbound: &[OutboundMessageRef<'_>]) -> TransportResult<()>;

    /// Drain whatever happened since the last call: completed sends, twin
    /// acks, desired-property pushes, inbound messages/methods, connection
    /// status transitions. Called once per `do_work` tick, after
    /// `send_batch` and `process_twin_item`.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// The transport's own pump; this is where real I/O happens. Called last
    /// in the driver loop (§4.9).
    fn do_work(&mut self);
}
