//! Zero-touch provisioning is an external collaborator, optional, and
//! conceptually its own small state machine (§4's "Provisioning as a
//! sub-state-machine"): its only interface toward this crate is a driver
//! pump and a completion callback. The client core drains that callback
//! once, on success, and uses the result to build the hub identity and
//! transport; it never reaches into the provisioning client's internals.

use crate::error::Result;

/// The outcome handed to the completion callback when provisioning finishes.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    pub assigned_hub: String,
    pub device_id: String,
}

/// Status updates delivered during registration, before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    ConnectingToProvisioningService,
    RegisteringDevice,
    AssigningHub,
}

/// Terminal registration outcome.
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    Assigned(ProvisioningResult),
    Failed(anyhow::Error),
}

/// The provisioning client vtable (§4, consumed + optional). A concrete
/// implementation talks to the provisioning service; the core only drives it
/// through `register_device`/`do_work` and reacts to whatever
/// [`RegistrationOutcome`] eventually shows up.
pub trait Provisioning {
    /// Kick off registration. `status` fires zero or more times before
    /// `register_device` later reports a terminal [`RegistrationOutcome`]
    /// via `poll_outcome`.
    fn register_device(&mut self) -> Result<()>;

    /// String-keyed option forwarding, same shape as the transport's
    /// `set_option` (§4.8's `logtrace` forwards here while not yet attached).
    fn set_option(&mut self, name: &str, value: &str) -> Result<()>;

    /// Custom payload sent with the registration request, if the enrollment
    /// requires one.
    fn set_provisioning_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// Pump the provisioning client's own I/O. Called once per driver tick
    /// while registration is in flight.
    fn do_work(&mut self);

    /// Non-blocking poll for status updates accumulated since the last call.
    fn poll_status(&mut self) -> Vec<RegistrationStatus>;

    /// Non-blocking poll for a terminal outcome. Returns `None` until
    /// registration has concluded one way or the other.
    fn poll_outcome(&mut self) -> Option<RegistrationOutcome>;
}
