//! Parses the free-form `Key=Value;...` connection string (and its
//! environment-variable equivalent for edge-hosted modules) into a normalized
//! [`Identity`].

use std::collections::HashMap;
use std::env;

use crate::error::{ClientError, Result};

const HOSTNAME_KEY: &str = "HostName";
const DEVICE_ID_KEY: &str = "DeviceId";
const SHARED_ACCESS_KEY_KEY: &str = "SharedAccessKey";
const SHARED_ACCESS_SIGNATURE_KEY: &str = "SharedAccessSignature";
const X509_KEY: &str = "x509";
const USE_PROVISIONING_KEY: &str = "UseProvisioning";
const GATEWAY_HOSTNAME_KEY: &str = "GatewayHostName";
const MODULE_ID_KEY: &str = "ModuleId";

const TRUE_VALUE: &str = "true";

const ENV_EDGEHUB_CONNECTION_STRING: &str = "EdgeHubConnectionString";
const ENV_EDGEHUB_CA_CERTIFICATE_FILE: &str = "EdgeModuleCACertificateFile";
const ENV_EDGE_AUTHSCHEME: &str = "IOTEDGE_AUTHSCHEME";
const ENV_EDGE_DEVICEID: &str = "IOTEDGE_DEVICEID";
const ENV_EDGE_MODULEID: &str = "IOTEDGE_MODULEID";
const ENV_EDGE_HUBHOSTNAME: &str = "IOTEDGE_IOTHUBHOSTNAME";
const ENV_EDGE_GATEWAYHOSTNAME: &str = "IOTEDGE_GATEWAYHOSTNAME";
const EDGE_AUTHSCHEME_SASTOKEN: &str = "sasToken";

/// How the device authenticates to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// A symmetric device key used to mint SAS tokens locally.
    SharedAccessKey(String),
    /// A pre-computed, already-signed token.
    SharedAccessSignature(String),
    /// Client-certificate authentication; credentials live in the
    /// authorization module / HSM, not in the connection string.
    X509,
    /// Zero-touch provisioning hands off credentials after enrollment.
    Provisioning,
}

/// A fully parsed and validated device (or module) identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub hub_name: String,
    pub hub_suffix: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub gateway_hostname: Option<String>,
    pub auth: AuthMode,
}

impl Identity {
    /// The full hub hostname, e.g. `myhub.azure-devices.net`.
    pub fn hub_hostname(&self) -> String {
        format!("{}.{}", self.hub_name, self.hub_suffix)
    }

    /// Parse a `Key=Value;Key=Value;...` connection string.
    ///
    /// Unknown keys are logged and ignored. See the validation rules in the
    /// module-level documentation for what combination of keys is required.
    pub fn parse(connection_string: &str) -> Result<Identity> {
        if connection_string.trim().is_empty() {
            return Err(ClientError::invalid_argument(
                "connection string must not be empty",
            ));
        }

        let mut fields: HashMap<&str, &str> = HashMap::new();
        for pair in connection_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => {
                    if !KNOWN_KEYS.contains(&key) {
                        log::warn!("ignoring unrecognized connection string key '{key}'");
                    }
                    fields.insert(key, value);
                }
                None => {
                    return Err(ClientError::invalid_argument(format!(
                        "malformed connection string segment '{pair}'"
                    )))
                }
            }
        }

        let hostname = fields.get(HOSTNAME_KEY).copied();
        let device_id = fields.get(DEVICE_ID_KEY).copied();

        let (hub_name, hub_suffix) = split_hostname(hostname)?;
        let device_id = device_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::invalid_argument("DeviceId is required"))?
            .to_owned();

        let auth = resolve_auth(
            fields.get(X509_KEY).copied(),
            fields.get(USE_PROVISIONING_KEY).copied(),
            fields.get(SHARED_ACCESS_KEY_KEY).copied(),
            fields.get(SHARED_ACCESS_SIGNATURE_KEY).copied(),
        )?;

        Ok(Identity {
            hub_name,
            hub_suffix,
            device_id,
            module_id: fields.get(MODULE_ID_KEY).map(|s| s.to_string()),
            gateway_hostname: fields.get(GATEWAY_HOSTNAME_KEY).map(|s| s.to_string()),
            auth,
        })
    }

    /// Build an [`Identity`] from the `IOTEDGE_*` environment variables used
    /// by edge-hosted modules. If `EdgeHubConnectionString` is set, it takes
    /// priority over every other environment variable, and this function
    /// requires `EdgeModuleCACertificateFile` to also be set (returned as
    /// the trust bundle path).
    pub fn from_environment() -> Result<(Identity, Option<String>)> {
        if let Ok(conn_str) = env::var(ENV_EDGEHUB_CONNECTION_STRING) {
            let ca_file = env::var(ENV_EDGEHUB_CA_CERTIFICATE_FILE).map_err(|_| {
                ClientError::invalid_argument(format!(
                    "{ENV_EDGEHUB_CA_CERTIFICATE_FILE} is required when {ENV_EDGEHUB_CONNECTION_STRING} is set"
                ))
            })?;
            let identity = Identity::parse(&conn_str)?;
            return Ok((identity, Some(ca_file)));
        }

        let auth_scheme = env::var(ENV_EDGE_AUTHSCHEME)
            .map_err(|_| ClientError::invalid_argument(format!("{ENV_EDGE_AUTHSCHEME} not set")))?;
        if auth_scheme != EDGE_AUTHSCHEME_SASTOKEN {
            return Err(ClientError::invalid_argument(format!(
                "unsupported {ENV_EDGE_AUTHSCHEME} value '{auth_scheme}'"
            )));
        }

        let device_id = env::var(ENV_EDGE_DEVICEID)
            .map_err(|_| ClientError::invalid_argument(format!("{ENV_EDGE_DEVICEID} not set")))?;
        let module_id = env::var(ENV_EDGE_MODULEID).ok();
        let hub_hostname = env::var(ENV_EDGE_HUBHOSTNAME)
            .map_err(|_| ClientError::invalid_argument(format!("{ENV_EDGE_HUBHOSTNAME} not set")))?;
        let gateway_hostname = env::var(ENV_EDGE_GATEWAYHOSTNAME).ok();
        let ca_file = env::var(ENV_EDGEHUB_CA_CERTIFICATE_FILE).ok();

        let (hub_name, hub_suffix) = split_hostname(Some(hub_hostname.as_str()))?;

        Ok((
            Identity {
                hub_name,
                hub_suffix,
                device_id,
                module_id,
                gateway_hostname,
                // Edge modules always authenticate with a SAS token minted
                // by the edge security daemon; the token itself is obtained
                // through the authorization module, not the connection
                // string.
                auth: AuthMode::Provisioning,
            },
            ca_file,
        ))
    }
}

const KNOWN_KEYS: &[&str] = &[
    HOSTNAME_KEY,
    DEVICE_ID_KEY,
    SHARED_ACCESS_KEY_KEY,
    SHARED_ACCESS_SIGNATURE_KEY,
    X509_KEY,
    USE_PROVISIONING_KEY,
    GATEWAY_HOSTNAME_KEY,
    MODULE_ID_KEY,
];

fn split_hostname(hostname: Option<&str>) -> Result<(String, String)> {
    let hostname = hostname
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::invalid_argument("HostName is required"))?;

    match hostname.split_once('.') {
        Some((name, suffix)) if !name.is_empty() && !suffix.is_empty() => {
            Ok((name.to_owned(), suffix.to_owned()))
        }
        _ => Err(ClientError::invalid_argument(
            "HostName must contain a '.' separating hub name from suffix",
        )),
    }
}

fn resolve_auth(
    x509: Option<&str>,
    use_provisioning: Option<&str>,
    key: Option<&str>,
    token: Option<&str>,
) -> Result<AuthMode> {
    let x509 = parse_true_flag(X509_KEY, x509)?;
    let provisioning = parse_true_flag(USE_PROVISIONING_KEY, use_provisioning)?;

    if x509 && provisioning {
        return Err(ClientError::invalid_argument(
            "x509 and UseProvisioning are mutually exclusive",
        ));
    }

    if x509 || provisioning {
        if key.is_some() || token.is_some() {
            return Err(ClientError::invalid_argument(
                "SharedAccessKey/SharedAccessSignature must be absent when x509 or UseProvisioning is set",
            ));
        }
        return Ok(if x509 {
            AuthMode::X509
        } else {
            AuthMode::Provisioning
        });
    }

    match (key, token) {
        (Some(key), None) => Ok(AuthMode::SharedAccessKey(key.to_owned())),
        (None, Some(token)) => Ok(AuthMode::SharedAccessSignature(token.to_owned())),
        (Some(_), Some(_)) => Err(ClientError::invalid_argument(
            "SharedAccessKey and SharedAccessSignature are mutually exclusive",
        )),
        (None, None) => Err(ClientError::invalid_argument(
            "exactly one of SharedAccessKey, SharedAccessSignature, x509, or UseProvisioning is required",
        )),
    }
}

fn parse_true_flag(key: &str, value: Option<&str>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(v) if v == TRUE_VALUE => Ok(true),
        Some(v) => Err(ClientError::invalid_argument(format!(
            "{key} must be '{TRUE_VALUE}' if present, got '{v}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_shared_key() {
        let id = Identity::parse("HostName=h.example.net;DeviceId=d;SharedAccessKey=k").unwrap();
        assert_eq!(id.hub_name, "h");
        assert_eq!(id.hub_suffix, "example.net");
        assert_eq!(id.device_id, "d");
        assert_eq!(id.auth, AuthMode::SharedAccessKey("k".to_owned()));
        assert!(id.gateway_hostname.is_none());
        assert!(id.module_id.is_none());
        assert_eq!(id.hub_hostname(), "h.example.net");
    }

    #[test]
    fn s2_key_and_token_conflict() {
        let err = Identity::parse(
            "HostName=h.example.net;DeviceId=d;SharedAccessKey=k;SharedAccessSignature=s",
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn s3_x509() {
        let id = Identity::parse("HostName=h.e.n;DeviceId=d;x509=true").unwrap();
        assert_eq!(id.auth, AuthMode::X509);
        assert_eq!(id.hub_name, "h");
        assert_eq!(id.hub_suffix, "e.n");

        let err = Identity::parse("HostName=h.e.n;DeviceId=d;x509=false").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let id = Identity::parse(
            "HostName=h.example.net;DeviceId=d;SharedAccessKey=k;SomeFutureKey=whatever",
        )
        .unwrap();
        assert_eq!(id.device_id, "d");
    }

    #[test]
    fn missing_device_id_fails() {
        let err = Identity::parse("HostName=h.example.net;SharedAccessKey=k").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn gateway_and_module_roundtrip() {
        let id = Identity::parse(
            "HostName=h.example.net;DeviceId=d;SharedAccessKey=k;GatewayHostName=gw.local;ModuleId=m1",
        )
        .unwrap();
        assert_eq!(id.gateway_hostname.as_deref(), Some("gw.local"));
        assert_eq!(id.module_id.as_deref(), Some("m1"));
    }
}
