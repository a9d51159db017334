//! IPv4 dissector.

use etherparse::Ipv4HeaderSlice;

use super::{layer_data, DissectContext, Dissector};
use crate::error::DissectError;
use crate::frame::{Layer, Payload, Value};
use crate::token::{Token, TokenRegistry};

/// IP protocol numbers the built-in dissectors continue into.
pub(crate) mod ip_protocol {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

#[derive(Debug, Clone)]
pub struct Ipv4Dissector {
    hints: [Token; 1],
    ipv4: Token,
    ttl: Token,
    protocol: Token,
    total_len: Token,
    identification: Token,
    fragment: Token,
    tcp: Token,
    udp: Token,
}

impl Ipv4Dissector {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get("[ipv4]")],
            ipv4: tokens.get("ipv4"),
            ttl: tokens.get(".ttl"),
            protocol: tokens.get(".protocol"),
            total_len: tokens.get(".len"),
            identification: tokens.get(".id"),
            fragment: tokens.get(".fragment"),
            tcp: tokens.get("[tcp]"),
            udp: tokens.get("[udp]"),
        }
    }
}

impl Dissector for Ipv4Dissector {
    fn name(&self) -> &'static str {
        "ipv4"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError> {
        let wk = ctx.well_known();
        let data = layer_data(layer, wk).ok_or(DissectError::MissingPayload { protocol: "ipv4" })?;
        let ip = Ipv4HeaderSlice::from_slice(&data).map_err(|e| DissectError::Malformed {
            protocol: "ipv4",
            reason: e.to_string(),
        })?;

        let header_len = ip.slice().len();
        let total_len = ip.total_len() as usize;
        if total_len < header_len {
            return Err(DissectError::Malformed {
                protocol: "ipv4",
                reason: format!("total length {total_len} shorter than header {header_len}"),
            });
        }
        // Ethernet padding trails short packets; captures may also be cut short.
        let end = total_len.min(data.len());

        let protocol = ip.protocol().0;
        let mut out = Layer::new(self.ipv4)
            .with_tag(self.ipv4)
            .with_property(wk.src, Value::ipv4(ip.source_addr()))
            .with_property(wk.dst, Value::ipv4(ip.destination_addr()))
            .with_property(self.ttl, ip.ttl())
            .with_property(self.protocol, protocol)
            .with_property(self.total_len, ip.total_len())
            .with_property(self.identification, ip.identification());

        let fragmented = ip.more_fragments() || ip.fragments_offset().value() != 0;
        if fragmented {
            // Fragments are not reassembled, so nothing above IP is decoded.
            out.add_property(self.fragment, ip.fragments_offset().value());
        } else {
            match protocol {
                ip_protocol::TCP => out.add_tag(self.tcp),
                ip_protocol::UDP => out.add_tag(self.udp),
                _ => {}
            }
        }
        out.add_payload(Payload::new(wk.data).with_slice(data.slice(header_len..end)));
        Ok(vec![out])
    }
}
