//! HTTP/1.1 request parsing.
//!
//! Parsing runs against the connection's reusable read buffer (never
//! borrowed past the call), copying every byte range a caller might keep —
//! the URL, header names/values, the body — into the per-request
//! [`Arena`](crate::arena::Arena). This is the arena doing the job the
//! teacher crate did with an `unsafe` buffer-to-`'static` transmute: the
//! copy is one bump-allocation per field, and the whole set is released in
//! a single operation when the request's arena resets.

use crate::{
    arena::Arena,
    errors::{ClientProtocolError, ErrorKind},
    http::{
        query::Query,
        types::{Header, HeaderMap, Method, Url, Version},
    },
};
use memchr::memchr;

/// Limits consulted while parsing a single request; mirrors
/// [`crate::config::RequestLimits`].
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub url_size: usize,
    pub url_parts: usize,
    pub url_query_parts: usize,
    pub header_count: usize,
    pub header_name_size: usize,
    pub header_value_size: usize,
    pub max_body_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            url_size: 2048,
            url_parts: 16,
            url_query_parts: 32,
            header_count: 64,
            header_name_size: 128,
            header_value_size: 4096,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct Request<'a> {
    method: Method,
    url: Url<'a>,
    version: Version,
    headers: HeaderMap<'a>,
    body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url<'a> {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn header(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderMap<'a> {
        &self.headers
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.content_length()
    }

    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Whether the client asked to keep the connection alive: explicit
    /// `Connection: keep-alive`, or HTTP/1.1's implicit default absent a
    /// `Connection: close`.
    pub fn keep_alive_requested(&self) -> bool {
        match self.headers.get(b"connection") {
            Some(v) => !v.eq_ignore_ascii_case(b"close"),
            None => matches!(self.version, Version::Http11),
        }
    }
}

/// Parses a full request out of `head` (request line + header lines, CRLF or
/// LF terminated, without the trailing blank line) and `body` (exactly
/// `Content-Length` bytes, already read by the caller). Returns a
/// `Request<'a>` wholly owned by `arena`.
pub fn parse<'a>(
    head: &[u8],
    body: &[u8],
    arena: &'a Arena,
    limits: &ParseLimits,
) -> Result<Request<'a>, ErrorKind> {
    let mut lines = HeadLines::new(head);

    let first_line = lines.next().ok_or(ClientProtocolError::InvalidMethod)?;
    let (method, url, version) = parse_request_line(first_line, arena, limits)?;

    let mut headers = HeaderMap::with_capacity(limits.header_count.min(64));
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if headers.len() >= limits.header_count {
            return Err(ClientProtocolError::TooManyHeaders.into());
        }
        let colon = memchr(b':', line).ok_or(ClientProtocolError::InvalidHeader)?;
        let name = trim(&line[..colon]);
        let value = trim(&line[colon + 1..]);
        if name.is_empty() || name.len() > limits.header_name_size {
            return Err(ClientProtocolError::InvalidHeader.into());
        }
        if value.len() > limits.header_value_size {
            return Err(ClientProtocolError::InvalidHeader.into());
        }
        if name.eq_ignore_ascii_case(b"content-length") {
            let parsed = std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or(ClientProtocolError::InvalidContentLength)?;
            headers.content_length = Some(parsed);
        }
        if name.eq_ignore_ascii_case(b"connection")
            && !value.eq_ignore_ascii_case(b"close")
            && !value.eq_ignore_ascii_case(b"keep-alive")
        {
            return Err(ClientProtocolError::InvalidConnection.into());
        }
        headers.push(Header::new(arena.alloc_slice(name), arena.alloc_slice(value)));
    }

    match headers.content_length() {
        Some(expected) if expected != body.len() => {
            return Err(ClientProtocolError::BodyMismatch {
                expected,
                available: body.len(),
            }
            .into());
        }
        None if !body.is_empty() => {
            return Err(ClientProtocolError::UnexpectedBody(body.len()).into());
        }
        _ => {}
    }
    if body.len() > limits.max_body_size {
        return Err(ClientProtocolError::BodyTooLarge.into());
    }

    Ok(Request {
        method,
        url,
        version,
        headers,
        body: arena.alloc_slice(body),
    })
}

fn parse_request_line<'a>(
    line: &[u8],
    arena: &'a Arena,
    limits: &ParseLimits,
) -> Result<(Method, Url<'a>, Version), ErrorKind> {
    let mut parts = line.split(|&b| b == b' ').filter(|s| !s.is_empty());
    let method_raw = parts.next().ok_or(ClientProtocolError::InvalidMethod)?;
    let url_raw = parts.next().ok_or(ClientProtocolError::InvalidUrl)?;
    let version_raw = parts.next().ok_or(ClientProtocolError::InvalidVersion)?;
    if parts.next().is_some() {
        return Err(ClientProtocolError::InvalidMethod.into());
    }

    let method = Method::from_bytes(method_raw)?;
    let url = parse_url(url_raw, arena, limits)?;
    let (version, _) = Version::from_bytes(version_raw)?;
    Ok((method, url, version))
}

fn parse_url<'a>(raw: &[u8], arena: &'a Arena, limits: &ParseLimits) -> Result<Url<'a>, ErrorKind> {
    if raw.is_empty() || raw[0] != b'/' || raw.len() > limits.url_size {
        return Err(ClientProtocolError::InvalidUrl.into());
    }

    let (path_raw, query_raw) = match memchr(b'?', raw) {
        Some(pos) => (&raw[..pos], Some(&raw[pos + 1..])),
        None => (raw, None),
    };

    let target = arena.alloc_slice(raw);
    let path = arena.alloc_slice(path_raw);

    let mut parts = Vec::new();
    for segment in path_raw.split(|&b| b == b'/').filter(|s| !s.is_empty()) {
        if parts.len() >= limits.url_parts {
            return Err(ClientProtocolError::InvalidUrl.into());
        }
        parts.push(arena.alloc_slice(segment));
    }

    let (query, query_parts) = match query_raw {
        Some(q) if !q.is_empty() => {
            let parsed: Vec<(&[u8], &[u8])> = Query::parse(q, limits.url_query_parts)
                .map_err(ClientProtocolError::Query)?;
            let owned_parts = parsed
                .into_iter()
                .map(|(k, v)| (arena.alloc_slice(k), arena.alloc_slice(v)))
                .collect();
            (Some(arena.alloc_slice(q)), owned_parts)
        }
        _ => (None, Vec::new()),
    };

    Ok(Url {
        target,
        path,
        parts,
        query,
        query_parts,
    })
}

/// Splits a header block on `\n`, tolerating either `\r\n` or bare `\n`
/// termination per line.
struct HeadLines<'b> {
    rest: &'b [u8],
}

impl<'b> HeadLines<'b> {
    fn new(head: &'b [u8]) -> Self {
        Self { rest: head }
    }
}

impl<'b> Iterator for HeadLines<'b> {
    type Item = &'b [u8];

    fn next(&mut self) -> Option<&'b [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        match memchr(b'\n', self.rest) {
            Some(pos) => {
                let mut line = &self.rest[..pos];
                if line.last() == Some(&b'\r') {
                    line = &line[..line.len() - 1];
                }
                self.rest = &self.rest[pos + 1..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = b"";
                Some(line)
            }
        }
    }
}

#[inline]
fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaPool;

    #[test]
    fn parses_simple_get() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET /users/42?sort=name HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n";
        let req = parse(head, b"", &arena, &ParseLimits::default()).unwrap();

        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.url().path(), b"/users/42");
        assert_eq!(req.url().path_segments(), &[b"users".as_slice(), b"42"]);
        assert_eq!(req.url().query(b"sort"), Some(b"name".as_slice()));
        assert_eq!(req.header(b"host"), Some(b"example.com".as_slice()));
        assert_eq!(req.body(), b"");
    }

    #[test]
    fn rejects_body_without_content_length() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"POST /echo HTTP/1.1\r\nHost: x\r\n";
        let err = parse(head, b"unexpected", &arena, &ParseLimits::default()).unwrap_err();
        assert_eq!(err.code(), "UNEXPECTED_BODY");
    }

    #[test]
    fn rejects_content_length_mismatch() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n";
        let err = parse(head, b"short", &arena, &ParseLimits::default()).unwrap_err();
        assert_eq!(err.code(), "BODY_MISMATCH");
    }

    #[test]
    fn static_before_wildcard_is_a_router_concern_not_parser() {
        // parser only extracts segments; precedence is the router's job.
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"GET /users/me HTTP/1.1\r\n";
        let req = parse(head, b"", &arena, &ParseLimits::default()).unwrap();
        assert_eq!(req.url().path_segments(), &[b"users".as_slice(), b"me"]);
    }

    #[test]
    fn trace_and_connect_are_rejected() {
        let pool = ArenaPool::new(1);
        let arena = pool.acquire();
        let head = b"TRACE / HTTP/1.1\r\n";
        let err = parse(head, b"", &arena, &ParseLimits::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_METHOD");
    }
}
