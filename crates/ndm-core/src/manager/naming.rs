//! Local file name for a new download.

/// Name used when neither the caller nor the URL offers one.
pub const FALLBACK_FILE_NAME: &str = "download";

/// Explicit name if non-blank, else the last URL path segment (percent-decoded),
/// else [`FALLBACK_FILE_NAME`]. The result is always a single path component.
pub fn file_name_for(url: &str, explicit: Option<&str>) -> String {
    explicit
        .map(clean)
        .filter(|n| is_usable(n))
        .or_else(|| last_path_segment(url).map(|s| clean(&s)).filter(|n| is_usable(n)))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode(segment))
}

fn is_usable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

/// Path separators and control characters become `_`; surrounding whitespace is dropped.
fn clean(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_name_wins() {
        assert_eq!(file_name_for("https://e.com/a.zip", Some("b.zip")), "b.zip");
        assert_eq!(file_name_for("https://e.com/a.zip", Some("  ")), "a.zip");
        assert_eq!(file_name_for("https://e.com/a.zip", Some("../x")), ".._x");
    }

    #[test]
    fn from_url_path() {
        assert_eq!(file_name_for("https://e.com/dir/file.iso?x=1", None), "file.iso");
        assert_eq!(file_name_for("https://e.com/dir/", None), "dir");
        assert_eq!(file_name_for("https://e.com/My%20File%2Bv2.pdf", None), "My File+v2.pdf");
        assert_eq!(file_name_for("https://e.com/a%2Fb", None), "a_b");
        assert_eq!(file_name_for("https://e.com/bad%zz", None), "bad%zz");
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(file_name_for("https://e.com/", None), FALLBACK_FILE_NAME);
        assert_eq!(file_name_for("not a url", None), FALLBACK_FILE_NAME);
        assert_eq!(file_name_for("https://e.com/..", None), FALLBACK_FILE_NAME);
    }
}
