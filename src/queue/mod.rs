//! Outbound telemetry and twin reported-state queues (§4.3, §4.4).

pub mod outbound;
pub mod twin;

pub use outbound::OutboundQueue;
pub use twin::{ItemIdAllocator, TwinQueues};
