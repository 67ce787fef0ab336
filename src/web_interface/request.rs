//! Byte-level HTTP/1.x request parsing.
//!
//! Only what one-shot form handling needs: the request line, a `Content-Length` lookup in
//! the raw header block, and a form-urlencoded body decoder. No header map is built.

use crate::error_handling::types::HttpError;
use std::collections::HashMap;

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Uppercased method token.
    pub method: String,
    /// Raw request target, query string and fragment included.
    pub target: String,
    pub version: String,
}

/// Offset just past the blank line ending the header block, if it has arrived.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Parses the first line of `head`. Exactly three non-empty, single-space separated tokens
/// are accepted.
pub fn parse_request_line(head: &[u8]) -> Result<RequestLine, HttpError> {
    let end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    // Latin-1: every byte maps to one char, so nothing is rejected at this stage
    let line: String = head[..end].iter().map(|&b| b as char).collect();

    let parts: Vec<&str> = line.split(' ').collect();
    match parts.as_slice() {
        [method, target, version]
            if !method.is_empty() && !target.is_empty() && !version.is_empty() =>
        {
            Ok(RequestLine {
                method: method.to_ascii_uppercase(),
                target: target.to_string(),
                version: version.to_string(),
            })
        }
        _ => Err(HttpError::MalformedRequestLine(line)),
    }
}

/// The request target with query string and fragment removed.
pub fn route_path(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

/// Coarse traversal and encoding guard: nothing is decoded, any `..` or `%` is refused.
pub fn is_suspicious_path(path: &str) -> bool {
    path.contains("..") || path.contains('%')
}

/// Reads `Content-Length` from the raw header block (request line excluded).
///
/// The declared length must be a positive integer no larger than `max`.
pub fn content_length(head: &[u8], max: usize) -> Result<usize, HttpError> {
    let text = String::from_utf8_lossy(head);
    let value = text
        .split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim())
        .ok_or(HttpError::MissingContentLength)?;

    let length: i128 = value
        .parse()
        .map_err(|_| HttpError::InvalidContentLength(value.to_string()))?;
    if length <= 0 {
        return Err(HttpError::InvalidContentLength(value.to_string()));
    }
    if length > max as i128 {
        return Err(HttpError::RequestTooLarge);
    }
    Ok(length as usize)
}

/// Decodes an `application/x-www-form-urlencoded` body. When a key repeats, the first value
/// wins.
pub fn parse_form(body: &[u8]) -> Result<HashMap<String, String>, HttpError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| HttpError::MalformedForm("body is not valid UTF-8".to_string()))?;
    if text.trim().is_empty() {
        return Err(HttpError::MalformedForm("empty body".to_string()));
    }
    if !text.contains('=') {
        return Err(HttpError::MalformedForm("no key=value pair".to_string()));
    }

    let mut fields = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(text.trim().as_bytes()) {
        fields
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &[u8] = b"POST /login HTTP/1.1\r\nHost: portal\r\ncontent-LENGTH:  27 \r\n\r\n";

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nrest"), Some(18));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
        assert_eq!(find_header_end(b""), None);
    }

    #[test]
    fn test_request_line_three_tokens() {
        let line = parse_request_line(b"get /index?x=1 HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.target, "/index?x=1");
        assert_eq!(line.version, "HTTP/1.1");
    }

    #[test]
    fn test_request_line_rejects_other_shapes() {
        for raw in [
            &b"GET /\r\n\r\n"[..],
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET  / HTTP/1.1\r\n\r\n",
            b"GET / \r\n\r\n",
            b"\r\n\r\n",
            b"\x16\x03\x01\x02\x00\x01\x00\x01\xfc\x03\x03",
        ] {
            assert!(
                matches!(parse_request_line(raw), Err(HttpError::MalformedRequestLine(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_route_path_strips_query_and_fragment() {
        assert_eq!(route_path("/login?next=/x"), "/login");
        assert_eq!(route_path("/index#top"), "/index");
        assert_eq!(route_path("/a#b?c"), "/a");
        assert_eq!(route_path("/"), "/");
    }

    #[test]
    fn test_suspicious_paths() {
        assert!(is_suspicious_path("/../etc/passwd"));
        assert!(is_suspicious_path("/%2e%2e/"));
        assert!(is_suspicious_path("/a..b"));
        assert!(!is_suspicious_path("/login"));
    }

    #[test]
    fn test_content_length_case_insensitive() {
        assert_eq!(content_length(HEAD, 1024), Ok(27));
    }

    #[test]
    fn test_content_length_rejections() {
        let head = |v: &str| format!("POST /login HTTP/1.1\r\nContent-Length: {}\r\n\r\n", v);
        assert_eq!(
            content_length(b"POST /login HTTP/1.1\r\nHost: a\r\n\r\n", 1024),
            Err(HttpError::MissingContentLength)
        );
        for bad in ["0", "-5", "abc", "", "1.5"] {
            assert!(
                matches!(
                    content_length(head(bad).as_bytes(), 1024),
                    Err(HttpError::InvalidContentLength(_))
                ),
                "accepted {:?}",
                bad
            );
        }
        assert_eq!(
            content_length(head("1025").as_bytes(), 1024),
            Err(HttpError::RequestTooLarge)
        );
        assert_eq!(
            content_length(head("99999999999999999999999").as_bytes(), 1024),
            Err(HttpError::RequestTooLarge)
        );
    }

    #[test]
    fn test_request_line_is_not_a_header() {
        let head = b"POST /Content-Length:5 HTTP/1.1\r\n\r\n";
        assert_eq!(content_length(head, 1024), Err(HttpError::MissingContentLength));
    }

    #[test]
    fn test_parse_form_decodes() {
        let form = parse_form(b"username=ad%20min&password=p%26ss+word&username=other").unwrap();
        assert_eq!(form["username"], "ad min");
        assert_eq!(form["password"], "p&ss word");
    }

    #[test]
    fn test_parse_form_rejections() {
        assert!(parse_form(b"").is_err());
        assert!(parse_form(b"   ").is_err());
        assert!(parse_form(b"justtext").is_err());
        assert!(parse_form(&[0xff, 0xfe, b'=']).is_err());
    }
}
