//! TCP dissector.
//!
//! Besides the `tcp` tag, layers carry the `tcp-stream` tag and an
//! `@reassembled` payload holding the segment data, which is what stream
//! analyzers consume. Segments are forwarded in capture order.

use etherparse::TcpHeaderSlice;

use super::{layer_data, DissectContext, Dissector};
use crate::error::DissectError;
use crate::frame::{Layer, Payload};
use crate::token::{Token, TokenRegistry};

/// Tag of layers whose `@reassembled` payloads form a TCP byte stream.
pub const TCP_STREAM: &str = "tcp-stream";

#[derive(Debug, Clone)]
pub struct TcpDissector {
    hints: [Token; 1],
    tcp: Token,
    stream: Token,
    seq: Token,
    ack: Token,
    flags: Token,
    window: Token,
}

impl TcpDissector {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get("[tcp]")],
            tcp: tokens.get("tcp"),
            stream: tokens.get(TCP_STREAM),
            seq: tokens.get(".seq"),
            ack: tokens.get(".ack"),
            flags: tokens.get(".flags"),
            window: tokens.get(".window"),
        }
    }
}

impl Dissector for TcpDissector {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError> {
        let wk = ctx.well_known();
        let data = layer_data(layer, wk).ok_or(DissectError::MissingPayload { protocol: "tcp" })?;
        let tcp = TcpHeaderSlice::from_slice(&data).map_err(|e| DissectError::Malformed {
            protocol: "tcp",
            reason: e.to_string(),
        })?;

        let header_len = tcp.slice().len();
        // Raw flag byte: CWR ECE URG ACK PSH RST SYN FIN
        let flags = data[13];

        let mut out = Layer::new(self.tcp)
            .with_tag(self.tcp)
            .with_tag(self.stream)
            .with_property(wk.src, tcp.source_port())
            .with_property(wk.dst, tcp.destination_port())
            .with_property(self.seq, tcp.sequence_number())
            .with_property(self.ack, tcp.acknowledgment_number())
            .with_property(self.flags, flags)
            .with_property(self.window, tcp.window_size());

        let segment = data.slice(header_len..);
        if !segment.is_empty() {
            out.add_payload(Payload::new(wk.reassembled).with_slice(segment));
        }
        Ok(vec![out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissector::test_utils::*;
    use crate::frame::Value;

    #[test]
    fn test_parse_tcp_segment() {
        let tokens = TokenRegistry::new();
        let tcp = dissect_one(
            &tokens,
            &TcpDissector::new(&tokens),
            TcpBuilder::new()
                .src_port(54321)
                .dst_port(80)
                .seq(1000)
                .psh_ack()
                .payload(b"GET / HTTP/1.1\r\n".to_vec())
                .build(),
        )
        .unwrap();

        let wk = tokens.well_known();
        assert!(tcp.has_tag(tokens.get(TCP_STREAM)));
        assert_eq!(tcp.property(wk.src).and_then(Value::as_u64), Some(54321));
        assert_eq!(tcp.property(wk.dst).and_then(Value::as_u64), Some(80));
        assert_eq!(tcp.property(tokens.get(".seq")).and_then(Value::as_u64), Some(1000));
        assert_eq!(tcp.property(tokens.get(".flags")).and_then(Value::as_u64), Some(0x18));

        let segment = tcp.payloads_of(wk.reassembled).next().unwrap().contiguous();
        assert_eq!(&segment[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_pure_ack_has_no_stream_data() {
        let tokens = TokenRegistry::new();
        let tcp = dissect_one(&tokens, &TcpDissector::new(&tokens), TcpBuilder::new().ack().build())
            .unwrap();
        assert!(tcp.payloads_of(tokens.well_known().reassembled).next().is_none());
    }

    #[test]
    fn test_truncated_header() {
        let tokens = TokenRegistry::new();
        let config = crate::config::SessionConfig::new();
        let root = link_layer(&tokens, "[tcp]", vec![0; 12]);
        assert!(matches!(
            TcpDissector::new(&tokens).analyze(&context(&tokens, &config), &root),
            Err(DissectError::Malformed { protocol: "tcp", .. })
        ));
    }
}
