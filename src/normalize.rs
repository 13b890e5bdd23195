/// URL normalization: the key-derivation function for stored pages
use log::{debug, error};
use url::Url;

/// Query segment dropped verbatim (confluence sidebar navigation suffix).
const TRACKING_SEGMENT: &str = "src=contextnavpagetreemode";

/// Query keys dropped wherever they appear.
const IGNORED_KEYS: [&str; 1] = ["lang"];

/// How a raw url relates to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// http(s) page with its storage key and origin
    Page { key: String, origin: String },
    /// Parsable, but not an http(s) url; classified as `disabled`
    Unsupported,
    /// Not an absolute url at all
    Malformed,
}

/// Normalize a url into its storage key.
///
/// Algorithm:
/// 1. Parse as an absolute url (failure is logged and yields `None`)
/// 2. Drop the fragment
/// 3. Keep the query, minus `lang=...` parameters and the
///    `src=contextnavpagetreemode` tracking parameter
/// 4. Return `origin + path + filtered query`
///
/// Examples:
/// - https://a.com/p#x → https://a.com/p
/// - https://a.com/p?lang=en&id=5 → https://a.com/p?id=5
/// - https://wiki.example.com/display/ABC/Link?src=contextnavpagetreemode → https://wiki.example.com/display/ABC/Link
pub fn normalize(raw_url: &str) -> Option<String> {
    let parsed = match Url::parse(raw_url.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Can not parse as url={}, error={}", raw_url, e);
            return None;
        }
    };

    let origin = parsed.origin();
    if !origin.is_tuple() {
        // mailto:, data:, file: ... have no origin to key on
        debug!("url has an opaque origin: {}", raw_url);
        return None;
    }

    let search = parsed.query().map(filter_query).unwrap_or_default();
    Some(format!("{}{}{}", origin.ascii_serialization(), parsed.path(), search))
}

/// Remove ignored parameters, keeping the rest in their original encoding and order.
fn filter_query(query: &str) -> String {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_ignored_segment(segment))
        .collect();

    if kept.is_empty() {
        String::new()
    } else {
        format!("?{}", kept.join("&"))
    }
}

fn is_ignored_segment(segment: &str) -> bool {
    let key = segment.split('=').next().unwrap_or(segment);
    IGNORED_KEYS.contains(&key) || segment == TRACKING_SEGMENT
}

/// The `scheme://host[:port]` part of a url
pub fn origin_of(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url.trim()).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Whether `candidate` is already a bare, normalized origin.
pub fn is_origin(candidate: &str) -> bool {
    origin_of(candidate).is_some_and(|origin| origin == candidate)
}

/// Only http and https pages are tracked.
pub fn is_supported_scheme(raw_url: &str) -> bool {
    Url::parse(raw_url.trim())
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Classify a raw url for the store: trackable page, unsupported scheme, or garbage.
pub fn inspect_url(raw_url: &str) -> UrlKind {
    match Url::parse(raw_url.trim()) {
        Err(_) => {
            error!("Can not parse as url={}", raw_url);
            UrlKind::Malformed
        }
        Ok(parsed) if !matches!(parsed.scheme(), "http" | "https") => UrlKind::Unsupported,
        Ok(parsed) => match (normalize(parsed.as_str()), origin_of(parsed.as_str())) {
            (Some(key), Some(origin)) => UrlKind::Page { key, origin },
            _ => UrlKind::Malformed,
        },
    }
}
