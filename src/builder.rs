//! `ClientBuilder` ties identity resolution, authorization, and transport
//! construction together before the state machine starts (§4.11), in the
//! style of the reference crate's `DeviceClientBuilder`: a chain of `with_*`
//! calls terminated by `build()`, which validates everything up front and
//! never itself blocks on network I/O.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::auth::{default_authorization, Authorization, AuthorizationFactory};
use crate::blob_upload::{BlobUploadFactory, NullBlobUploadFactory};
use crate::client::{Client, TransportFactory, TransportHandle};
use crate::error::{ClientError, Result};
use crate::identity::Identity;
use crate::product_info::{PlatformInfo, UnknownPlatform};
use crate::provisioning::Provisioning;
use crate::transport::Transport;

enum IdentitySource {
    Resolved(Identity, Option<Vec<u8>>),
    Provisioning(Box<dyn Provisioning>, TransportFactory),
}

/// Builds a [`Client`]. Owns no runtime state once [`ClientBuilder::build`]
/// returns; everything afterward lives on the `Client` itself.
pub struct ClientBuilder {
    source: IdentitySource,
    instance_override: Option<String>,
    gateway_host_override: Option<String>,
    authorization_factory: Option<Box<dyn AuthorizationFactory>>,
    platform: Option<Box<dyn PlatformInfo>>,
    blob_upload_factory: Option<Box<dyn BlobUploadFactory>>,
    transport: Option<TransportHandle>,
}

impl ClientBuilder {
    fn with_source(source: IdentitySource) -> Self {
        ClientBuilder {
            source,
            instance_override: None,
            gateway_host_override: None,
            authorization_factory: None,
            platform: None,
            blob_upload_factory: None,
            transport: None,
        }
    }

    /// Parse a `HostName=...;DeviceId=...;...` connection string (§4.1).
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let identity = Identity::parse(connection_string)?;
        Ok(Self::with_source(IdentitySource::Resolved(identity, None)))
    }

    /// Build the identity from the `IOTEDGE_*` environment variables used by
    /// edge-hosted modules (§4.1's edge-module variant).
    pub fn from_environment() -> Result<Self> {
        let (identity, ca_file) = Identity::from_environment()?;
        let trust_bundle = ca_file
            .map(|path| {
                fs::read(&path).map_err(|e| {
                    ClientError::invalid_argument(format!(
                        "unable to read trust bundle at '{path}': {e}"
                    ))
                })
            })
            .transpose()?;
        Ok(Self::with_source(IdentitySource::Resolved(
            identity,
            trust_bundle,
        )))
    }

    /// Hand the device off to zero-touch provisioning instead of a known
    /// identity. `transport_factory` builds the hub transport once
    /// provisioning assigns a hub and device id.
    pub fn from_provisioning(
        provisioning: Box<dyn Provisioning>,
        transport_factory: TransportFactory,
    ) -> Self {
        Self::with_source(IdentitySource::Provisioning(provisioning, transport_factory))
    }

    /// Override the hub instance this device connects to, taking priority
    /// over whatever the connection string or environment resolved.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance_override = Some(instance.into());
        self
    }

    /// Override the gateway hostname (edge-hosted scenarios routing through
    /// a local gateway module instead of the hub directly).
    pub fn with_gateway_host(mut self, gateway_host: impl Into<String>) -> Self {
        self.gateway_host_override = Some(gateway_host.into());
        self
    }

    /// Supply the already-constructed transport for a directly-resolved
    /// identity. Required unless the builder was created via
    /// [`ClientBuilder::from_provisioning`], which builds its own transport
    /// from the assigned hub.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(TransportHandle::Owned(transport));
        self
    }

    /// Supply a transport shared with other clients (§9's shared-ownership
    /// note). Dropping this client's `Client` will not drop the transport.
    pub fn with_shared_transport(mut self, transport: Rc<RefCell<dyn Transport>>) -> Self {
        self.transport = Some(TransportHandle::Shared(transport));
        self
    }

    pub fn with_authorization_factory(mut self, factory: Box<dyn AuthorizationFactory>) -> Self {
        self.authorization_factory = Some(factory);
        self
    }

    pub fn with_platform(mut self, platform: Box<dyn PlatformInfo>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_blob_upload_factory(mut self, factory: Box<dyn BlobUploadFactory>) -> Self {
        self.blob_upload_factory = Some(factory);
        self
    }

    /// Validate the accumulated configuration (§4.1/§7) and produce a
    /// `Client`. Never touches the network itself; for a directly-resolved
    /// identity the transport is registered with the hub on the first
    /// `do_work` call, and for a provisioning-backed identity the whole
    /// REGISTERING → ATTACHED sequence runs through the driver loop.
    pub fn build(self) -> Result<Client> {
        let platform = self.platform.unwrap_or_else(|| Box::new(UnknownPlatform));
        let blob_upload_factory = self
            .blob_upload_factory
            .unwrap_or_else(|| Box::new(NullBlobUploadFactory));

        match self.source {
            IdentitySource::Resolved(identity, trust_bundle) => {
                let identity = apply_overrides(identity, self.instance_override, self.gateway_host_override);
                let transport = self.transport.ok_or_else(|| {
                    ClientError::invalid_argument(
                        "a transport is required for a directly-resolved identity; call with_transport or with_shared_transport",
                    )
                })?;
                let authorization = build_authorization(
                    self.authorization_factory.as_deref(),
                    &identity,
                    trust_bundle,
                )?;
                Ok(Client::new_attached(
                    identity,
                    authorization,
                    transport,
                    platform,
                    blob_upload_factory,
                ))
            }
            IdentitySource::Provisioning(provisioning, transport_factory) => {
                if self.transport.is_some() {
                    return Err(ClientError::invalid_argument(
                        "a transport cannot be supplied up front for a provisioning-backed identity",
                    ));
                }
                // The identity isn't known yet; authorization starts out
                // with no trust bundle and is rebuilt with one implicitly
                // once the transport itself negotiates it, mirroring how
                // provisioning-backed clients only learn their hub identity
                // after registration completes (§4.2).
                let authorization: Box<dyn Authorization> = Box::new(
                    crate::auth::StaticAuthorization::new(None),
                );
                Ok(Client::new_provisioning(
                    authorization,
                    provisioning,
                    transport_factory,
                    platform,
                    blob_upload_factory,
                ))
            }
        }
    }
}

fn apply_overrides(
    mut identity: Identity,
    instance_override: Option<String>,
    gateway_host_override: Option<String>,
) -> Identity {
    if let Some(instance) = instance_override {
        identity.hub_name = instance;
    }
    if let Some(gateway_host) = gateway_host_override {
        identity.gateway_hostname = Some(gateway_host);
    }
    identity
}

fn build_authorization(
    factory: Option<&dyn AuthorizationFactory>,
    identity: &Identity,
    trust_bundle: Option<Vec<u8>>,
) -> Result<Box<dyn Authorization>> {
    match factory {
        Some(factory) => factory.build(identity, trust_bundle),
        None => Ok(default_authorization(identity, trust_bundle)),
    }
}
