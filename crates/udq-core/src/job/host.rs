//! Names derived from URLs: host labels used to group jobs in stats, and
//! default filenames.
//!
//! Labels are normalised down to the lowercase host of the source URL so
//! different paths (and `www.` variants) on the same site group together.

const UNKNOWN_HOST: &str = "unknown";
const FALLBACK_FILENAME: &str = "download.bin";

/// Derives a grouping label from a source URL, e.g. `https://www.Example.com/f` -> `example.com`.
/// Unparseable URLs and URLs without a host yield `"unknown"`.
pub fn host_label(source_url: &str) -> String {
    let Ok(parsed) = url::Url::parse(source_url.trim()) else {
        return UNKNOWN_HOST.to_string();
    };
    match parsed.host_str() {
        Some(host) if !host.is_empty() => {
            let host = host.to_ascii_lowercase();
            host.strip_prefix("www.")
                .map(str::to_string)
                .unwrap_or(host)
        }
        _ => UNKNOWN_HOST.to_string(),
    }
}

/// Last non-empty path segment of `url` (not percent-decoded).
/// Falls back to "download.bin".
pub fn filename_from_url(url: &str) -> String {
    url::Url::parse(url.trim())
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}
