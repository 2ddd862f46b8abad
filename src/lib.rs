//! Device-side client core for a cloud messaging hub.
//!
//! This crate implements the state machine, queues, and dispatch tables a
//! device or edge module drives to talk to a cloud hub: connection-string or
//! environment identity resolution, optional zero-touch provisioning,
//! telemetry and reported-state queues, and callback dispatch for
//! cloud-to-device messages, direct methods, and desired-property updates.
//! It does not implement a wire protocol itself — see [`transport::Transport`]
//! for the boundary a concrete MQTT/AMQP/HTTP implementation fills in.
//!
//! [`Client`] is single-owner and cooperatively driven: construct one with
//! [`ClientBuilder`], then call [`Client::do_work`] on whatever cadence the
//! host application schedules (a timer, an event loop tick, a dedicated
//! thread). Nothing here spawns a thread or blocks on I/O; that is the
//! transport's job.

mod auth;
mod blob_upload;
mod builder;
mod client;
mod diagnostics;
mod dispatch;
mod error;
mod identity;
mod method_invoke;
mod options;
mod product_info;
mod provisioning;
mod queue;
mod retry;
mod tick;
pub mod transport;

pub use auth::{default_authorization, Authorization, AuthorizationFactory, StaticAuthorization};
pub use blob_upload::{BlobUploadFactory, BlobUploadModule, NullBlobUpload, NullBlobUploadFactory};
pub use builder::ClientBuilder;
pub use client::{Client, PendingIntents, RegistrationState, TransportFactory, TransportHandle};
pub use diagnostics::{DiagnosticSampler, PercentageSampler};
pub use dispatch::message::MessageCallback;
pub use dispatch::method::{MethodCallback, MethodHandle, MethodResponse};
pub use error::{ClientError, Result};
pub use identity::{AuthMode, Identity};
pub use method_invoke::MethodInvoker;
pub use product_info::{PlatformInfo, UnknownPlatform};
pub use provisioning::{Provisioning, ProvisioningResult, RegistrationOutcome, RegistrationStatus};
pub use retry::{RetryPolicy, RetrySettings};
