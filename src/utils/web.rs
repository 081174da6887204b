//! Page URL helpers — only http(s) pages take part in rule sync.

use url::Url;

/// Hostname of an `http`/`https` URL; `None` for browser-internal schemes,
/// host-less URLs and anything unparsable.
pub fn web_hostname(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(ToOwned::to_owned)
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_web_url(raw: &str) -> bool {
    web_hostname(raw).is_some()
}
