//! HTTP/1.1 response builder and serializer.
//!
//! `Response` enforces build order with a small state machine
//! (`Clean` -> `Headers` -> `Complete`) backed by `debug_assert!`s in the
//! builder methods rather than scattered checks. `Handled` is the zero-sized
//! proof that a
//! handler actually finished the response (via `.body()`, `.no_content()`,
//! or similar) rather than silently returning without one.

use crate::http::types::{StatusCode, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Clean,
    Headers,
    Complete,
}

/// Proof, returned by every response-terminating builder method, that a
/// handler produced a response.
#[derive(Debug)]
pub struct Handled(());

pub struct Response {
    status: StatusCode,
    version: Version,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    pub(crate) keep_alive: bool,
    state: ResponseState,
}

impl Response {
    pub(crate) fn new(version: Version) -> Self {
        Self {
            status: StatusCode::Ok,
            version,
            headers: Vec::with_capacity(8),
            body: Vec::new(),
            keep_alive: true,
            state: ResponseState::Clean,
        }
    }

    pub(crate) fn reset(&mut self, version: Version) {
        self.status = StatusCode::Ok;
        self.version = version;
        self.headers.clear();
        self.body.clear();
        self.keep_alive = true;
        self.state = ResponseState::Clean;
    }

    /// Sets the status code. Must be called before any `header()`/`body()`
    /// call; calling it afterwards is a bug in the handler, not a recoverable
    /// condition, hence the `debug_assert!` rather than a `Result`.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert_eq!(
            self.state,
            ResponseState::Clean,
            "status() must be called before header()/body()"
        );
        self.status = status;
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        debug_assert_ne!(self.state, ResponseState::Complete, "response already complete");
        self.state = ResponseState::Headers;
        let name = name.into();
        if name.eq_ignore_ascii_case("connection") {
            self.keep_alive = false;
        }
        self.headers.push((name, value.into()));
        self
    }

    pub fn content_type(&mut self, mime: impl Into<String>) -> &mut Self {
        self.header("content-type", mime)
    }

    /// Writes `value` as the body and marks the response complete.
    pub fn body<W: WriteBuffer>(&mut self, value: W) -> Handled {
        value.write_into(&mut self.body);
        self.state = ResponseState::Complete;
        Handled(())
    }

    pub fn no_content(&mut self) -> Handled {
        debug_assert_eq!(self.state, ResponseState::Clean);
        self.status = StatusCode::NoContent;
        self.state = ResponseState::Complete;
        Handled(())
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Swaps the body wholesale, e.g. to replace it with a compressed
    /// encoding. Leaves `state`/`content-length` bookkeeping to the caller:
    /// used only by middleware that run strictly after the handler.
    pub(crate) fn replace_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Renders the full wire-format response (status line, headers,
    /// blank line, body).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(self.status.into_first_line(self.version));
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.has_header("content-length") {
            out.extend_from_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
        }
        if !self.has_header("connection") {
            out.extend_from_slice(b"connection: ");
            out.extend_from_slice(if self.keep_alive { b"keep-alive" } else { b"close" });
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Types that can be written as a response body without an intermediate
/// allocation beyond the copy into the response's own buffer.
pub trait WriteBuffer {
    fn write_into(&self, buf: &mut Vec<u8>);
}

macro_rules! impl_write_buffer_bytes {
    ($($t:ty),+ $(,)?) => {
        $(impl WriteBuffer for $t {
            fn write_into(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(self.as_ref());
            }
        })+
    };
}

macro_rules! impl_write_buffer_str {
    ($($t:ty),+ $(,)?) => {
        $(impl WriteBuffer for $t {
            fn write_into(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(AsRef::<str>::as_ref(self).as_bytes());
            }
        })+
    };
}

impl_write_buffer_bytes!(&[u8], Vec<u8>);
impl_write_buffer_str!(&str, String, std::borrow::Cow<'_, str>);

impl WriteBuffer for serde_json::Value {
    fn write_into(&self, buf: &mut Vec<u8>) {
        // infallible: `Value` always serializes.
        serde_json::to_writer(buf, self).expect("Value serialization cannot fail");
    }
}

impl WriteBuffer for () {
    fn write_into(&self, _buf: &mut Vec<u8>) {}
}
