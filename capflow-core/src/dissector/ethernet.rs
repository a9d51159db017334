//! Ethernet II dissector.

use etherparse::Ethernet2HeaderSlice;

use super::{layer_data, DissectContext, Dissector};
use crate::error::DissectError;
use crate::frame::{Layer, Payload, Value};
use crate::token::{Token, TokenRegistry};

/// Link hint of Ethernet capture records.
pub const LINK_ETHERNET: &str = "[eth]";

/// Well-known EtherType values (IEEE 802).
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
}

const VLAN_TAG_LEN: usize = 4;

/// Ethernet II dissector, with a single 802.1Q tag unwrapped.
#[derive(Debug, Clone)]
pub struct EthernetDissector {
    hints: [Token; 1],
    eth: Token,
    ether_type: Token,
    vlan: Token,
    ipv4: Token,
    ipv6: Token,
}

impl EthernetDissector {
    pub fn new(tokens: &TokenRegistry) -> Self {
        Self {
            hints: [tokens.get(LINK_ETHERNET)],
            eth: tokens.get("eth"),
            ether_type: tokens.get(".type"),
            vlan: tokens.get(".vlan"),
            ipv4: tokens.get("[ipv4]"),
            ipv6: tokens.get("[ipv6]"),
        }
    }
}

impl Dissector for EthernetDissector {
    fn name(&self) -> &'static str {
        "eth"
    }

    fn hints(&self) -> &[Token] {
        &self.hints
    }

    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError> {
        let wk = ctx.well_known();
        let data = layer_data(layer, wk).ok_or(DissectError::MissingPayload { protocol: "eth" })?;
        let eth = Ethernet2HeaderSlice::from_slice(&data).map_err(|e| DissectError::Malformed {
            protocol: "eth",
            reason: e.to_string(),
        })?;

        let mut out = Layer::new(self.eth)
            .with_tag(self.eth)
            .with_property(wk.src, Value::mac(&eth.source()))
            .with_property(wk.dst, Value::mac(&eth.destination()));

        let mut header_len = eth.slice().len();
        let mut ether_type = eth.ether_type().0;
        if ether_type == ethertype::VLAN {
            let needed = header_len + VLAN_TAG_LEN;
            if data.len() < needed {
                return Err(DissectError::Truncated {
                    protocol: "eth",
                    needed,
                    have: data.len(),
                });
            }
            let tci = u16::from_be_bytes([data[header_len], data[header_len + 1]]);
            out.add_property(self.vlan, tci & 0x0fff);
            ether_type = u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]);
            header_len = needed;
        }
        out.add_property(self.ether_type, ether_type);

        match ether_type {
            ethertype::IPV4 => out.add_tag(self.ipv4),
            ethertype::IPV6 => out.add_tag(self.ipv6),
            _ => {}
        }
        out.add_payload(Payload::new(wk.data).with_slice(data.slice(header_len..)));
        Ok(vec![out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::dissector::test_utils::*;

    #[test]
    fn test_parse_ethernet_ipv4() {
        let tokens = TokenRegistry::new();
        let frame = dissect_one(
            &tokens,
            &EthernetDissector::new(&tokens),
            EthernetBuilder::new()
                .src_mac([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
                .ipv4()
                .payload(vec![1, 2, 3])
                .build(),
        );

        let eth = frame.unwrap();
        assert_eq!(eth.id, tokens.get("eth"));
        assert!(eth.has_tag(tokens.get("[ipv4]")));
        assert_eq!(
            eth.property(tokens.get(".src")).and_then(Value::as_str),
            Some("00:11:22:33:44:55")
        );
        assert_eq!(
            eth.property(tokens.get(".type")).and_then(Value::as_u64),
            Some(0x0800)
        );
        let data = layer_data(&eth, tokens.well_known()).unwrap();
        assert_eq!(&data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_parse_vlan_tagged() {
        let tokens = TokenRegistry::new();
        let mut payload = vec![0x00, 0x64, 0x86, 0xdd];
        payload.extend_from_slice(&[9, 9]);
        let eth = dissect_one(
            &tokens,
            &EthernetDissector::new(&tokens),
            EthernetBuilder::new().ethertype(ethertype::VLAN).payload(payload).build(),
        )
        .unwrap();

        assert_eq!(eth.property(tokens.get(".vlan")).and_then(Value::as_u64), Some(100));
        assert!(eth.has_tag(tokens.get("[ipv6]")));
        let data = layer_data(&eth, tokens.well_known()).unwrap();
        assert_eq!(&data[..], &[9, 9]);
    }

    #[test]
    fn test_arp_has_no_next_hint() {
        let tokens = TokenRegistry::new();
        let eth = dissect_one(
            &tokens,
            &EthernetDissector::new(&tokens),
            EthernetBuilder::new().arp().build(),
        )
        .unwrap();
        assert_eq!(eth.tags(), &[tokens.get("eth")]);
    }

    #[test]
    fn test_truncated_frame() {
        let tokens = TokenRegistry::new();
        let config = SessionConfig::new();
        let root = link_layer(&tokens, LINK_ETHERNET, vec![0u8; 10]);
        let ctx = context(&tokens, &config);
        assert!(matches!(
            EthernetDissector::new(&tokens).analyze(&ctx, &root),
            Err(DissectError::Malformed { protocol: "eth", .. })
        ));
    }
}
