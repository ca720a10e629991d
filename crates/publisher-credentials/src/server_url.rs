//! Server URL normalization
//!
//! Equivalent spellings of a server URL (host case, default ports, duplicate
//! or trailing slashes, dot segments) normalize to the same string, so
//! credentials can be compared by URL.

use url::Url;

use crate::error::{CredentialsError, Result};

/// Canonicalize a server URL.
///
/// The result is `scheme://host[:port][/path]` with a lowercase host, no
/// default port, no empty path segments, no trailing slash, and no query or
/// fragment.
pub fn normalize_server_url(raw: &str) -> Result<String> {
    let parsed = parse_server_url(raw)?;
    let segments = path_segments(&parsed);
    Ok(join(&origin(&parsed), &segments))
}

/// All candidate server roots of a URL, shortest first.
///
/// `https://host/a/b` yields `https://host`, `https://host/a`, `https://host/a/b`.
pub fn possible_server_urls(raw: &str) -> Result<Vec<String>> {
    let parsed = parse_server_url(raw)?;
    let origin = origin(&parsed);
    let segments = path_segments(&parsed);

    Ok((0..=segments.len())
        .map(|len| join(&origin, &segments[..len]))
        .collect())
}

/// Find the server root that answers, trying the full path first.
///
/// Returns the first candidate for which `probe` succeeds. When none does,
/// returns the original URL together with the last probe error.
pub fn discover_server_url<F, E>(raw: &str, mut probe: F) -> (String, Option<E>)
where
    F: FnMut(&str) -> std::result::Result<(), E>,
    E: From<CredentialsError>,
{
    let candidates = match possible_server_urls(raw) {
        Ok(candidates) => candidates,
        Err(err) => return (raw.to_string(), Some(E::from(err))),
    };

    let mut last_error = None;
    for candidate in candidates.iter().rev() {
        match probe(candidate) {
            Ok(()) => return (candidate.clone(), None),
            Err(err) => last_error = Some(err),
        }
    }

    (raw.to_string(), last_error)
}

fn parse_server_url(raw: &str) -> Result<Url> {
    if raw != raw.trim() {
        return Err(CredentialsError::InvalidUrl(format!(
            "{:?}: surrounding whitespace",
            raw
        )));
    }

    let parsed = Url::parse(raw).map_err(|e| CredentialsError::InvalidUrl(format!("{}: {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CredentialsError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                raw, other
            )))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CredentialsError::InvalidUrl(format!("{}: missing host", raw)));
    }

    Ok(parsed)
}

fn origin(parsed: &Url) -> String {
    // Url already lowercases the host and drops default ports
    parsed.origin().ascii_serialization()
}

fn path_segments(parsed: &Url) -> Vec<String> {
    parsed
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn join(origin: &str, segments: &[String]) -> String {
    if segments.is_empty() {
        origin.to_string()
    } else {
        format!("{}/{}", origin, segments.join("/"))
    }
}
