//! HTTP HEAD / metadata probing.
//!
//! Uses the curl crate (libcurl) to fetch response headers and derive the
//! resource size and whether byte-range requests can be used.

mod parse;

pub(crate) use parse::status_code;

use std::str;
use std::time::Duration;

use crate::fallback::FallbackPolicy;
use crate::headers;

/// What the probe learned about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Size in bytes; 0 when unknown (no `Content-Length`, chunked encoding).
    pub content_length: u64,
    /// `content_length > 0` and the server sent `Accept-Ranges: bytes`.
    pub supports_ranges: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    Transport(#[from] curl::Error),
    #[error("HTTP error {0}")]
    Http(u32),
}

impl ProbeError {
    /// True if the failure should switch the download to a single connection.
    pub fn is_fallback_eligible(&self, policy: &FallbackPolicy) -> bool {
        match self {
            ProbeError::Http(code) => policy.is_eligible_status(*code),
            ProbeError::Transport(_) => false,
        }
    }
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Follows redirects; only the headers of the final response are considered.
/// Blocks the current thread; call from `spawn_blocking` or a worker thread.
pub fn probe(url: &str, request_headers: &[(String, String)]) -> Result<ProbeResult, ProbeError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;
    easy.http_headers(headers::to_curl_list(request_headers)?)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                // A new status line starts a new response (redirect hop).
                if status_code(s).is_some() {
                    lines.clear();
                }
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        tracing::debug!(url, code, "probe returned non-2xx");
        return Err(ProbeError::Http(code));
    }

    let result = parse::parse_headers(&lines);
    tracing::debug!(
        url,
        content_length = result.content_length,
        supports_ranges = result.supports_ranges,
        "probe complete"
    );
    Ok(result)
}
