//! The options router (§4.8): a string-keyed table rather than nested
//! conditionals (§9's "Option-name dispatch"), since the option surface is
//! part of the public ABI and grows by addition, not by restructuring.

use std::time::Duration;

use crate::auth::Authorization;
use crate::blob_upload::{BlobUploadFactory, BlobUploadModule};
use crate::diagnostics::PercentageSampler;
use crate::error::{ClientError, Result};
use crate::product_info::{self, PlatformInfo};
use crate::transport::Transport;

const OPT_MESSAGE_TIMEOUT: &str = "messageTimeout";
const OPT_PRODUCT_INFO: &str = "product_info";
const OPT_DIAG_SAMPLING_PERCENTAGE: &str = "diag_sampling_percentage";
const OPT_BLOB_UPLOAD_TIMEOUT_SECS: &str = "blob_upload_timeout_secs";
const OPT_CURLOPT_VERBOSE: &str = "CURLOPT_VERBOSE";
const OPT_SAS_TOKEN_REFRESH_TIME: &str = "sas_token_refresh_time";
const OPT_SAS_TOKEN_LIFETIME: &str = "sas_token_lifetime";
const OPT_LOGTRACE: &str = "logtrace";

/// Everything `set_option` might need to touch, borrowed for the duration of
/// one call. `transport` is `None` while the client hasn't attached yet (see
/// the `logtrace` row in §4.8); `provisioning` is the complementary case.
pub struct OptionContext<'a> {
    pub message_timeout_ms: &'a mut Option<u64>,
    pub user_product_info: &'a mut Option<String>,
    pub product_info: &'a mut String,
    pub platform: &'a dyn PlatformInfo,
    pub diagnostic_sampler: &'a mut PercentageSampler,
    pub blob_upload: &'a mut Option<Box<dyn BlobUploadModule>>,
    pub blob_upload_factory: &'a dyn BlobUploadFactory,
    pub authorization: &'a mut dyn Authorization,
    pub log_trace: &'a mut bool,
    pub transport: Option<&'a mut dyn Transport>,
    pub provisioning: Option<&'a mut dyn crate::provisioning::Provisioning>,
}

/// Route one `(name, value)` pair to whatever owns it. Matches the table in
/// §4.8 exactly; the messageTimeout contract explicitly does not rewrite
/// deadlines of already-queued messages (enforced by the outbound queue
/// storing its own timeout span per entry, not a reference back here).
pub fn set_option(ctx: OptionContext<'_>, name: &str, value: &str) -> Result<()> {
    match name {
        OPT_MESSAGE_TIMEOUT => {
            *ctx.message_timeout_ms = Some(parse_u64(name, value)?);
            Ok(())
        }
        OPT_PRODUCT_INFO => {
            *ctx.user_product_info = Some(value.to_owned());
            *ctx.product_info = product_info::compose(ctx.user_product_info.as_deref(), ctx.platform);
            Ok(())
        }
        OPT_DIAG_SAMPLING_PERCENTAGE => {
            let percentage = parse_u64(name, value)? as u32;
            ctx.diagnostic_sampler
                .set_percentage(percentage)
                .map_err(ClientError::invalid_argument)
        }
        OPT_BLOB_UPLOAD_TIMEOUT_SECS | OPT_CURLOPT_VERBOSE => {
            let module = ensure_blob_upload(ctx.blob_upload, ctx.blob_upload_factory)?;
            module.set_option(name, value)
        }
        OPT_SAS_TOKEN_REFRESH_TIME => {
            ctx.authorization
                .set_sas_token_refresh_time(Duration::from_secs(parse_u64(name, value)?));
            Ok(())
        }
        OPT_SAS_TOKEN_LIFETIME => {
            ctx.authorization
                .set_sas_token_lifetime(Duration::from_secs(parse_u64(name, value)?));
            Ok(())
        }
        OPT_LOGTRACE => {
            *ctx.log_trace = parse_bool(name, value)?;
            match ctx.transport {
                Some(transport) => transport
                    .set_option(name, value)
                    .map_err(|e| ClientError::Error(e.0)),
                None => match ctx.provisioning {
                    Some(provisioning) => provisioning.set_option(name, value),
                    None => Ok(()),
                },
            }
        }
        _ => {
            let Some(transport) = ctx.transport else {
                return Err(ClientError::NotYetProvisioned);
            };
            transport
                .set_option(name, value)
                .map_err(|e| ClientError::Error(e.0))?;
            if let Some(module) = ctx.blob_upload.as_mut() {
                if let Err(err) = module.set_option(name, value) {
                    log::debug!("best-effort blob-upload forward of '{name}' failed: {err}");
                }
            }
            Ok(())
        }
    }
}

fn ensure_blob_upload<'a>(
    slot: &'a mut Option<Box<dyn BlobUploadModule>>,
    factory: &dyn BlobUploadFactory,
) -> Result<&'a mut Box<dyn BlobUploadModule>> {
    if slot.is_none() {
        *slot = Some(factory.create()?);
    }
    Ok(slot.as_mut().expect("just populated"))
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| ClientError::invalid_argument(format!("'{name}' expects an integer, got '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ClientError::invalid_argument(format!(
            "'{name}' expects 'true' or 'false', got '{value}'"
        ))),
    }
}
