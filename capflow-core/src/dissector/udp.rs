//! UDP dissector.

use etherparse::UdpHeaderSlice;

use super::{layer_data, DissectContext, Dissector};
use crate::error::DissectError;
use crate::frame::{Layer, Payload};
use crate::token::{Token, TokenRegistry};

const UDP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct UdpDissector {
    hints: [Token; 1],
    udp: Token,
    length: Token,
}

impl UdpDissector {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get("[udp]")],
            udp: tokens.get("udp"),
            length: tokens.get(".len"),
        }
    }
}

impl Dissector for UdpDissector {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError> {
        let wk = ctx.well_known();
        let data = layer_data(layer, wk).ok_or(DissectError::MissingPayload { protocol: "udp" })?;
        let udp = UdpHeaderSlice::from_slice(&data).map_err(|e| DissectError::Malformed {
            protocol: "udp",
            reason: e.to_string(),
        })?;

        let end = (udp.length() as usize).clamp(UDP_HEADER_LEN, data.len());
        Ok(vec![Layer::new(self.udp)
            .with_tag(self.udp)
            .with_property(wk.src, udp.source_port())
            .with_property(wk.dst, udp.destination_port())
            .with_property(self.length, udp.length())
            .with_payload(Payload::new(wk.data).with_slice(data.slice(UDP_HEADER_LEN..end)))])
    }
}
