//! HTTP/1.x line analyzer using httparse.
//!
//! Each CRLF-terminated line of a TCP stream is one unit. Request lines,
//! status lines and header lines each derive an `http` layer; anything else
//! (blank lines, bodies) derives nothing.

use httparse::{Request, Response, Status, EMPTY_HEADER};

use crate::error::StreamError;
use crate::frame::Layer;
use crate::stream::{StreamAnalyzer, StreamContext};
use crate::token::{Token, TokenRegistry};

/// Session option holding the accepted HTTP ports.
pub const HTTP_PORTS_OPTION: &str = "httpPorts";

/// HTTP/1.x request, status and header line analyzer on `tcp-stream`.
#[derive(Debug, Clone)]
pub struct HttpLineAnalyzer {
    hints: [Token; 1],
    http: Token,
    line: Token,
    method: Token,
    path: Token,
    version: Token,
    status: Token,
    reason: Token,
    header: Token,
    value: Token,
    direction: Token,
}

impl HttpLineAnalyzer {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get("tcp-stream")],
            http: tokens.get("http"),
            line: tokens.get(".line"),
            method: tokens.get(".method"),
            path: tokens.get(".path"),
            version: tokens.get(".version"),
            status: tokens.get(".status"),
            reason: tokens.get(".reason"),
            header: tokens.get(".header"),
            value: tokens.get(".value"),
            direction: tokens.get(".direction"),
        }
    }

    fn layer(&self, line: &str, ctx: &StreamContext<'_>) -> Layer {
        Layer::new(self.http)
            .with_tag(self.http)
            .with_property(self.line, line)
            .with_property(self.direction, ctx.direction.as_str())
    }

    /// httparse wants a complete head, so the line is terminated with an
    /// empty header block before parsing.
    fn terminated(unit: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(unit.len() + 4);
        buf.extend_from_slice(unit);
        buf.extend_from_slice(b"\r\n\r\n");
        buf
    }
}

impl StreamAnalyzer for HttpLineAnalyzer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn layer_id(&self) -> Token {
        self.http
    }

    fn delimiter(&self) -> &[u8] {
        b"\r\n"
    }

    fn ports_option(&self) -> Option<&str> {
        Some(HTTP_PORTS_OPTION)
    }

    fn analyze(&self, unit: &[u8], ctx: &StreamContext<'_>) -> Result<Option<Layer>, StreamError> {
        if unit.is_empty() {
            return Ok(None);
        }
        let Ok(line) = std::str::from_utf8(unit) else {
            return Ok(None);
        };
        let buf = Self::terminated(unit);

        if line.starts_with("HTTP/") {
            let mut headers = [EMPTY_HEADER; 0];
            let mut resp = Response::new(&mut headers);
            return match resp.parse(&buf) {
                Ok(Status::Complete(_)) => {
                    let mut layer = self.layer(line, ctx);
                    if let Some(version) = resp.version {
                        layer.add_property(self.version, format!("HTTP/1.{version}"));
                    }
                    if let Some(code) = resp.code {
                        layer.add_property(self.status, code);
                    }
                    if let Some(reason) = resp.reason {
                        layer.add_property(self.reason, reason);
                    }
                    Ok(Some(layer))
                }
                Ok(Status::Partial) | Err(_) => Err(StreamError::Analyzer {
                    analyzer: "http",
                    reason: format!("malformed status line {line:?}"),
                }),
            };
        }

        let mut headers = [EMPTY_HEADER; 0];
        let mut req = Request::new(&mut headers);
        if let Ok(Status::Complete(_)) = req.parse(&buf) {
            let mut layer = self.layer(line, ctx);
            if let Some(method) = req.method {
                layer.add_property(self.method, method);
            }
            if let Some(path) = req.path {
                layer.add_property(self.path, path);
            }
            if let Some(version) = req.version {
                layer.add_property(self.version, format!("HTTP/1.{version}"));
            }
            return Ok(Some(layer));
        }

        match line.split_once(':') {
            Some((name, value)) if is_token(name) => Ok(Some(
                self.layer(line, ctx)
                    .with_property(self.header, name)
                    .with_property(self.value, value.trim()),
            )),
            _ => Ok(None),
        }
    }
}

/// RFC 9110 token characters, used to tell header lines from body text.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}
