//! Blob upload is an external collaborator for large file transfer (§1,
//! §4.8). The core never implements the upload itself; it only lazily
//! constructs the module on first relevant `set_option` call and forwards
//! options to it afterward.

use crate::error::Result;

/// The blob-upload module's option-forwarding surface. A real
/// implementation would also expose the actual upload APIs, but those are
/// out of scope here.
pub trait BlobUploadModule {
    fn set_option(&mut self, name: &str, value: &str) -> Result<()>;
}

/// Builds a [`BlobUploadModule`] on first use. Supplied by whatever
/// transport/storage integration a deployment wires in.
pub trait BlobUploadFactory {
    fn create(&self) -> Result<Box<dyn BlobUploadModule>>;
}

/// A module that accepts and silently discards every option, for
/// deployments that never configure blob upload but still want the
/// lazy-create/forward plumbing to be exercised uniformly.
#[derive(Default)]
pub struct NullBlobUpload;

impl BlobUploadModule for NullBlobUpload {
    fn set_option(&mut self, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NullBlobUploadFactory;

impl BlobUploadFactory for NullBlobUploadFactory {
    fn create(&self) -> Result<Box<dyn BlobUploadModule>> {
        Ok(Box::new(NullBlobUpload))
    }
}
