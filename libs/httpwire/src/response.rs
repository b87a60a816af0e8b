//! Response construction and serialization.

use crate::{reason_phrase, Headers, Version};

/// An HTTP/1.x response the router writes to a client.
///
/// The router only ever generates small terminal responses (redirects and
/// error statuses); backend responses are relayed as raw bytes and never
/// pass through this type.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub version: Version,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, version: Version) -> Self {
        Self {
            status,
            version,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header, builder style.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Serializes the status line, headers, blank line, and body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        let status_line = format!(
            "{} {} {}\r\n",
            self.version,
            self.status,
            reason_phrase(self.status)
        );
        out.extend_from_slice(status_line.as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}
