//! Remote object naming and URL helpers shared by the image hosts.

use chrono::{DateTime, Datelike, Local};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURI`-style encoding leaves alone: unreserved plus URI delimiters.
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

/// A single path segment: only unreserved characters survive.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// File name without its last extension: `photo.PNG` -> `photo`, `a.b.png` -> `a.b`.
///
/// Names without an extension (or with nothing before the dot) are returned unchanged.
pub fn file_stem(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// Extension after the last dot, if there is a non-empty stem before it.
pub fn extension(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Replaces everything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Object-store key: `<namespace><sanitized stem>_<8 random hex>.<ext>`.
pub fn object_name(file_name: &str, namespace: &str) -> String {
    let stem = sanitize(&file_stem(file_name));
    let token = uuid::Uuid::new_v4().simple().to_string();
    let random = &token[..8];
    match extension(file_name) {
        Some(ext) => format!(
            "{namespace}{stem}_{random}.{}",
            sanitize(ext).to_ascii_lowercase()
        ),
        None => format!("{namespace}{stem}_{random}"),
    }
}

/// Date-bucketed location used by the git hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedPath {
    /// `YYYY-M-D`, month and day without padding.
    pub dir: String,
    /// `<epoch millis>-<original name>`.
    pub file: String,
}

impl DatedPath {
    pub fn joined(&self) -> String {
        format!("{}/{}", self.dir, self.file)
    }
}

pub fn dated_path(file_name: &str, now: DateTime<Local>) -> DatedPath {
    DatedPath {
        dir: format!("{}-{}-{}", now.year(), now.month(), now.day()),
        file: format!(
            "{}-{}",
            now.timestamp_millis(),
            file_name.replace(['/', '\\'], "_")
        ),
    }
}

/// Percent-encodes like `encodeURI`: URI delimiters stay, spaces and non-ASCII are escaped.
pub fn encode_uri(raw: &str) -> String {
    utf8_percent_encode(raw, URI).to_string()
}

/// Percent-encodes one path segment for an API URL.
pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

pub fn with_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

/// Public URL of `key` under a configured domain.
///
/// The trailing `/` on the domain is optional and `https://` is assumed when no scheme is given,
/// including for protocol-relative `//host` domains.
pub fn public_url(domain: &str, key: &str) -> String {
    let domain = domain.trim();
    let base = if domain.contains("://") {
        domain.to_string()
    } else if let Some(rest) = domain.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{domain}")
    };
    encode_uri(&format!(
        "{}{}",
        with_trailing_slash(&base),
        key.trim_start_matches('/')
    ))
}

/// MIME type guessed from the file extension, `application/octet-stream` when unknown.
pub fn content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .to_string()
}
