//! Header-line parsing for the HEAD probe.

use super::ProbeResult;

/// Reads the size and range support out of the final response's header lines.
/// Ranges only count when the size is known.
pub(crate) fn parse_headers(lines: &[String]) -> ProbeResult {
    let mut content_length = 0u64;
    let mut accept_ranges = false;

    let fields = lines
        .iter()
        .filter_map(|l| l.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()));
    for (name, value) in fields {
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(content_length);
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            accept_ranges = value
                .split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        }
    }

    ProbeResult {
        content_length,
        supports_ranges: content_length > 0 && accept_ranges,
    }
}

/// Status code of an `HTTP/x.y NNN reason` line.
pub(crate) fn status_code(line: &str) -> Option<u32> {
    let mut words = line.split_whitespace();
    words.next().filter(|w| w.starts_with("HTTP/"))?;
    words.next()?.parse().ok()
}
