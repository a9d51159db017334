//! IPv6 dissector.
//!
//! Only the fixed header is decoded; the chain continues when the next
//! header is TCP or UDP directly.

use etherparse::Ipv6HeaderSlice;

use super::ipv4::ip_protocol;
use super::{layer_data, DissectContext, Dissector};
use crate::error::DissectError;
use crate::frame::{Layer, Payload, Value};
use crate::token::{Token, TokenRegistry};

#[derive(Debug, Clone)]
pub struct Ipv6Dissector {
    hints: [Token; 1],
    ipv6: Token,
    hop_limit: Token,
    next_header: Token,
    payload_len: Token,
    tcp: Token,
    udp: Token,
}

impl Ipv6Dissector {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get("[ipv6]")],
            ipv6: tokens.get("ipv6"),
            hop_limit: tokens.get(".hlim"),
            next_header: tokens.get(".nxt"),
            payload_len: tokens.get(".len"),
            tcp: tokens.get("[tcp]"),
            udp: tokens.get("[udp]"),
        }
    }
}

impl Dissector for Ipv6Dissector {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError> {
        let wk = ctx.well_known();
        let data = layer_data(layer, wk).ok_or(DissectError::MissingPayload { protocol: "ipv6" })?;
        let ip = Ipv6HeaderSlice::from_slice(&data).map_err(|e| DissectError::Malformed {
            protocol: "ipv6",
            reason: e.to_string(),
        })?;

        let header_len = ip.slice().len();
        let end = (header_len + ip.payload_length() as usize).min(data.len());
        let next = ip.next_header().0;

        let mut out = Layer::new(self.ipv6)
            .with_tag(self.ipv6)
            .with_property(wk.src, Value::ipv6(ip.source_addr()))
            .with_property(wk.dst, Value::ipv6(ip.destination_addr()))
            .with_property(self.hop_limit, ip.hop_limit())
            .with_property(self.next_header, next)
            .with_property(self.payload_len, ip.payload_length());
        match next {
            ip_protocol::TCP => out.add_tag(self.tcp),
            ip_protocol::UDP => out.add_tag(self.udp),
            _ => {}
        }
        out.add_payload(Payload::new(wk.data).with_slice(data.slice(header_len..end)));
        Ok(vec![out])
    }
}
