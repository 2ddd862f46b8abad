//! Builds the UA-style `product_info` string sent with every connection:
//! `<user tag> <sdk name>/<sdk version> (<platform info>)`.

/// Process-wide platform info, external to the core (consumed, not owned).
///
/// A transport implementation supplies this so the composed string reflects
/// whatever OS/arch information it can report; the core never inspects the
/// host itself.
pub trait PlatformInfo {
    /// A short "(OSName OSVersion; Architecture)"-shaped description.
    fn describe(&self) -> String;
}

/// A platform descriptor that reports nothing, for transports that don't
/// have anything meaningful to add.
#[derive(Default)]
pub struct UnknownPlatform;

impl PlatformInfo for UnknownPlatform {
    fn describe(&self) -> String {
        "(unknown)".to_owned()
    }
}

const SDK_NAME: &str = "hubclient";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compose the product-info string. `user_product` is whatever the
/// application passed to `set_option("product_info", ...)`; `None` omits it.
pub fn compose(user_product: Option<&str>, platform: &dyn PlatformInfo) -> String {
    let sdk_tag = format!("{SDK_NAME}/{SDK_VERSION}");
    match user_product {
        Some(product) if !product.is_empty() => {
            format!("{product} {sdk_tag} {}", platform.describe())
        }
        _ => format!("{sdk_tag} {}", platform.describe()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_with_and_without_user_tag() {
        let platform = UnknownPlatform;
        let with_tag = compose(Some("acme-widget/2.0"), &platform);
        assert!(with_tag.starts_with("acme-widget/2.0 hubclient/"));

        let without_tag = compose(None, &platform);
        assert!(without_tag.starts_with("hubclient/"));
    }

    #[test]
    fn repeated_compose_overwrites_rather_than_appends() {
        let platform = UnknownPlatform;
        let first = compose(Some("a"), &platform);
        let second = compose(Some("b"), &platform);
        assert!(!second.contains('a'));
        assert_ne!(first, second);
    }
}
