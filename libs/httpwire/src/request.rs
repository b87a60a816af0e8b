//! Request head parsing and re-serialization.

use crate::{Headers, Version, WireError, MAX_HEADERS, MAX_HEAD_BYTES};

/// A parsed HTTP/1.x request head.
///
/// Only the request line and header section are represented; any body bytes
/// that follow belong to the caller's buffer.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: Version,
    pub headers: Headers,
}

impl Request {
    /// Parses a request head from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete head
    /// section, and `Ok(Some((request, consumed)))` once it does, where
    /// `consumed` is the number of bytes the head occupied. Bytes past
    /// `consumed` are the start of the body or of a pipelined message.
    pub fn parse(buf: &[u8]) -> Result<Option<(Request, usize)>, WireError> {
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_storage);
        let consumed = match parsed.parse(buf)? {
            httparse::Status::Partial => {
                // The cap only applies to an incomplete head: a complete
                // head followed by body bytes may legitimately overrun it.
                if buf.len() > MAX_HEAD_BYTES {
                    return Err(WireError::HeadTooLarge);
                }
                return Ok(None);
            }
            httparse::Status::Complete(len) => len,
        };

        // httparse guarantees these are present once it reports Complete.
        let method = parsed.method.unwrap_or_default().to_string();
        let target = parsed.path.unwrap_or_default().to_string();
        let version = Version::from_minor(parsed.version.unwrap_or(1))?;

        let mut headers = Headers::new();
        for header in parsed.headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| WireError::HeaderEncoding)?;
            headers.append(header.name, value);
        }

        Ok(Some((
            Request {
                method,
                target,
                version,
                headers,
            },
            consumed,
        )))
    }

    /// Serializes the head back to wire format.
    ///
    /// The output reproduces the parsed request line and headers in their
    /// original order and casing, terminated by the blank line.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.version.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// The `Host` header value, if the request carries one.
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET: &[u8] = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";

    #[test]
    fn complete_request_parses() {
        let (req, consumed) = Request::parse(GET).unwrap().unwrap();
        assert_eq!(consumed, GET.len());
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/index.html");
        assert_eq!(req.version, Version::Http11);
        assert_eq!(req.host(), Some("example.com"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn partial_request_returns_none() {
        for cut in [0, 5, GET.len() - 1] {
            assert!(Request::parse(&GET[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn consumed_excludes_body_bytes() {
        let mut buf = GET.to_vec();
        buf.extend_from_slice(b"leftover body bytes");
        let (_, consumed) = Request::parse(&buf).unwrap().unwrap();
        assert_eq!(consumed, GET.len());
        assert_eq!(&buf[consumed..], b"leftover body bytes");
    }

    #[test]
    fn encode_round_trips_byte_for_byte() {
        let (req, _) = Request::parse(GET).unwrap().unwrap();
        assert_eq!(req.encode(), GET);
    }

    #[test]
    fn encode_carries_appended_headers() {
        let (mut req, _) = Request::parse(GET).unwrap().unwrap();
        req.headers
            .append("Forwarded", "for=\"198.51.100.7:4242\";proto=https");
        let encoded = req.encode();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.ends_with("Forwarded: for=\"198.51.100.7:4242\";proto=https\r\n\r\n"));
        assert!(text.starts_with("GET /index.html HTTP/1.1\r\n"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Request::parse(b"\0\0garbage\r\n\r\n").is_err());
    }

    #[test]
    fn http10_version_is_kept() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap().unwrap();
        assert_eq!(req.version, Version::Http10);
        assert!(req.host().is_none());
    }

    #[test]
    fn oversized_head_is_rejected() {
        // A handful of very long header lines, still incomplete: stays
        // under the header-count limit but blows the byte cap.
        let mut huge = Vec::from(&b"GET / HTTP/1.1\r\n"[..]);
        let padding = format!("X-Padding: {}\r\n", "a".repeat(4000));
        while huge.len() <= MAX_HEAD_BYTES {
            huge.extend_from_slice(padding.as_bytes());
        }
        assert!(matches!(
            Request::parse(&huge),
            Err(WireError::HeadTooLarge)
        ));
    }

    #[test]
    fn complete_head_with_large_body_is_not_capped() {
        let mut buf = GET.to_vec();
        buf.extend_from_slice(&vec![b'x'; MAX_HEAD_BYTES + 1]);
        let (_, consumed) = Request::parse(&buf).unwrap().unwrap();
        assert_eq!(consumed, GET.len());
    }
}
