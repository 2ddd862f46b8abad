//! The callback/dispatch layer (§4.5–§4.7): fans transport events out to
//! user handlers across the three coexisting callback shapes.

pub mod input_routes;
pub mod message;
pub mod method;

pub use input_routes::InputRouteRegistry;
pub use message::{dispatch_message, MessageCallback};
pub use method::{dispatch_sync, MethodCallback, MethodDispatchOutcome, MethodHandle, MethodHandleAllocator};
