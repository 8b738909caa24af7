//! Outbound request headers for the probe and chunk transfers.
//!
//! Caller-supplied headers are passed through except for connection-management
//! headers, which would corrupt libcurl's own framing. A `User-Agent` is added when
//! the caller did not supply one.

use std::collections::HashMap;

/// Header names never forwarded from caller input (compared case-insensitively).
pub const BLOCKED_HEADERS: [&str; 8] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
];

/// Default User-Agent when neither the caller nor the config provides one.
pub const DEFAULT_USER_AGENT: &str = concat!("ndm/", env!("CARGO_PKG_VERSION"));

fn is_blocked(name: &str) -> bool {
    // Range is owned by the worker (resume offset); a caller value would fight it.
    name.eq_ignore_ascii_case("range") || BLOCKED_HEADERS.iter().any(|b| name.eq_ignore_ascii_case(b))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b':')
}

/// Returns the header lines to send, sorted by name for stable requests.
pub fn sanitize(custom: &HashMap<String, String>, default_user_agent: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = custom
        .iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| is_valid_name(k) && !is_blocked(k) && !v.contains(['\r', '\n']))
        .collect();
    out.sort_by(|a, b| a.0.to_ascii_lowercase().cmp(&b.0.to_ascii_lowercase()));

    let has_agent = out.iter().any(|(k, _)| k.eq_ignore_ascii_case("user-agent"));
    if !has_agent {
        out.push(("User-Agent".to_string(), default_user_agent.to_string()));
    }
    out
}

/// Builds the libcurl header list ("Name: value" per entry).
pub fn to_curl_list(headers: &[(String, String)]) -> Result<curl::easy::List, curl::Error> {
    let mut list = curl::easy::List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k, v))?;
    }
    Ok(list)
}

/// Parses a "Name: value" string (CLI `-H` flag) into a pair.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if !is_valid_name(name) {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
