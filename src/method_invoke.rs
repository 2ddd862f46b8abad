//! The edge-module method-invocation subsystem is an external, optional
//! collaborator (§1): it lets a module invoke a direct method on another
//! module or leaf device on the same edge gateway. The core only carries an
//! opaque handle to it and tears it down on destroy (§4.10); invocation
//! itself is out of scope here.

/// Marker trait for an edge-module method-invocation handle. The core holds
/// this purely for lifetime management.
pub trait MethodInvoker {}
