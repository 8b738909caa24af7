//! Just enough HTTP/1.1 request parsing for the two command routes.

/// Largest accepted header section (request line + headers + blank line).
pub const MAX_HEADER_BYTES: usize = 64 * 1024;
/// Largest accepted body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("header section exceeds {} bytes", MAX_HEADER_BYTES)]
    HeaderTooLarge,
    #[error("body exceeds {} bytes", MAX_BODY_BYTES)]
    BodyTooLarge,
    #[error("header section is not UTF-8")]
    NotUtf8,
    #[error("malformed request line")]
    BadRequestLine,
}

/// Parses `buf` if it holds a complete request; `Ok(None)` means read more.
///
/// Only the request line and `Content-Length` are looked at. A missing or unparsable
/// `Content-Length` means no body.
pub fn parse(buf: &[u8]) -> Result<Option<Request>, RequestError> {
    let Some(head_len) = find(buf, HEADER_END) else {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(RequestError::HeaderTooLarge);
        }
        return Ok(None);
    };
    if head_len + HEADER_END.len() > MAX_HEADER_BYTES {
        return Err(RequestError::HeaderTooLarge);
    }
    let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| RequestError::NotUtf8)?;
    let mut lines = head.split("\r\n").filter(|l| !l.is_empty());

    let request_line = lines.next().ok_or(RequestError::BadRequestLine)?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Err(RequestError::BadRequestLine);
    };

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::BodyTooLarge);
    }

    let body_start = head_len + HEADER_END.len();
    if buf.len() < body_start + content_length {
        return Ok(None);
    }
    Ok(Some(Request {
        method: method.to_string(),
        path: path.to_string(),
        body: buf[body_start..body_start + content_length].to_vec(),
    }))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
