//! Authorization is an external collaborator (consumed, not owned): it holds
//! the actual key material or HSM handle and mints SAS tokens or presents
//! certificates on demand. The client core only needs enough of a contract to
//! construct one from a parsed [`crate::identity::Identity`], forward the SAS
//! lifetime/refresh knobs from `set_option`, and fetch a trust bundle for
//! edge-hosted scenarios.

use std::time::Duration;

use crate::error::Result;
use crate::identity::{AuthMode, Identity};

/// Credential material and token minting, external to the core.
pub trait Authorization {
    /// Return the PEM-encoded trust bundle to validate the hub's server
    /// certificate against, if one was provided (edge-hosted modules set
    /// this from `EdgeModuleCACertificateFile`).
    fn trust_bundle(&self) -> Option<&[u8]>;

    /// How long a minted SAS token remains valid.
    fn set_sas_token_lifetime(&mut self, lifetime: Duration);

    /// How long before expiry the transport should ask for a fresh token.
    fn set_sas_token_refresh_time(&mut self, refresh: Duration);
}

/// Constructs an [`Authorization`] implementation from a resolved identity.
/// A transport (or a test fake) supplies the concrete minting logic; this
/// trait exists so the client core can ask for one without depending on how
/// tokens are actually produced.
pub trait AuthorizationFactory {
    fn build(&self, identity: &Identity, trust_bundle: Option<Vec<u8>>) -> Result<Box<dyn Authorization>>;
}

/// A trivial [`Authorization`] for identities that don't need local token
/// minting (x509 and provisioning-backed credentials: the certificate or the
/// provisioning-issued token is presented as-is).
pub struct StaticAuthorization {
    trust_bundle: Option<Vec<u8>>,
}

impl StaticAuthorization {
    pub fn new(trust_bundle: Option<Vec<u8>>) -> Self {
        StaticAuthorization { trust_bundle }
    }
}

impl Authorization for StaticAuthorization {
    fn trust_bundle(&self) -> Option<&[u8]> {
        self.trust_bundle.as_deref()
    }

    fn set_sas_token_lifetime(&mut self, _lifetime: Duration) {
        // No locally-minted token to apply a lifetime to.
    }

    fn set_sas_token_refresh_time(&mut self, _refresh: Duration) {}
}

/// Picks a reasonable default [`Authorization`] for an identity's auth mode.
/// Shared-key and pre-signed-token identities still rely on the transport to
/// actually mint/present credentials on the wire; this just establishes the
/// trust bundle plumbing uniformly across auth modes.
pub fn default_authorization(identity: &Identity, trust_bundle: Option<Vec<u8>>) -> Box<dyn Authorization> {
    match &identity.auth {
        AuthMode::SharedAccessKey(_)
        | AuthMode::SharedAccessSignature(_)
        | AuthMode::X509
        | AuthMode::Provisioning => Box::new(StaticAuthorization::new(trust_bundle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_bundle_roundtrips() {
        let auth = StaticAuthorization::new(Some(b"cert".to_vec()));
        assert_eq!(auth.trust_bundle(), Some(b"cert".as_slice()));
    }

    #[test]
    fn default_authorization_carries_trust_bundle_for_every_mode() {
        let identity = Identity::parse("HostName=h.e.n;DeviceId=d;x509=true").unwrap();
        let auth = default_authorization(&identity, Some(b"ca".to_vec()));
        assert_eq!(auth.trust_bundle(), Some(b"ca".as_slice()));
    }
}
