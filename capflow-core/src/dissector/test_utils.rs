//! Test utilities for dissectors.
//!
//! Provides builders for constructing test packets and helpers for running a
//! single dissector against raw bytes.

use bytes::Bytes;

use super::{DissectContext, Dissector};
use crate::config::SessionConfig;
use crate::frame::{Layer, Payload};
use crate::token::TokenRegistry;

/// Context for frame 1 at depth 0.
pub fn context<'a>(tokens: &'a TokenRegistry, config: &'a SessionConfig) -> DissectContext<'a> {
    DissectContext {
        frame_id: 1,
        timestamp_us: 0,
        depth: 0,
        tokens,
        config,
    }
}

/// A layer tagged `hint` carrying `data` as its `@data` payload.
pub fn link_layer(tokens: &TokenRegistry, hint: &str, data: Vec<u8>) -> Layer {
    let hint = tokens.get(hint);
    Layer::new(hint)
        .with_tag(hint)
        .with_payload(Payload::new(tokens.well_known().data).with_slice(Bytes::from(data)))
}

/// Run `dissector` on `data` tagged with its first hint and return the
/// first layer it produces.
pub fn dissect_one(tokens: &TokenRegistry, dissector: &dyn Dissector, data: Vec<u8>) -> Option<Layer> {
    let config = SessionConfig::new();
    let hint = dissector.hints()[0];
    let root = Layer::new(hint)
        .with_tag(hint)
        .with_payload(Payload::new(tokens.well_known().data).with_slice(Bytes::from(data)));
    dissector
        .analyze(&context(tokens, &config), &root)
        .expect("dissector failed")
        .into_iter()
        .next()
}

/// Ethernet + IPv4 + TCP frame between two fixed hosts.
pub fn tcp_frame(src: ([u8; 4], u16), dst: ([u8; 4], u16), payload: &[u8]) -> Vec<u8> {
    EthernetBuilder::new()
        .ipv4()
        .payload(
            Ipv4Builder::new()
                .src_ip(src.0)
                .dst_ip(dst.0)
                .tcp()
                .payload(
                    TcpBuilder::new()
                        .src_port(src.1)
                        .dst_port(dst.1)
                        .psh_ack()
                        .payload(payload.to_vec())
                        .build(),
                )
                .build(),
        )
        .build()
}

/// Builder for constructing Ethernet frames.
#[derive(Debug, Clone)]
pub struct EthernetBuilder {
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    ethertype: u16,
    payload: Vec<u8>,
}

impl Default for EthernetBuilder {
    fn default() -> Self {
        Self {
            src_mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            dst_mac: [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
            ethertype: 0x0800,
            payload: Vec::new(),
        }
    }
}

impl EthernetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_mac(mut self, mac: [u8; 6]) -> Self {
        self.src_mac = mac;
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn ipv4(self) -> Self {
        self.ethertype(0x0800)
    }

    pub fn ipv6(self) -> Self {
        self.ethertype(0x86DD)
    }

    pub fn arp(self) -> Self {
        self.ethertype(0x0806)
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(14 + self.payload.len());
        frame.extend_from_slice(&self.dst_mac);
        frame.extend_from_slice(&self.src_mac);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Builder for constructing IPv4 packets.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    flags_fragment: u16,
    ttl: u8,
    protocol: u8,
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    payload: Vec<u8>,
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self {
            flags_fragment: 0x0000,
            ttl: 64,
            protocol: 6,
            src_ip: [192, 168, 1, 1],
            dst_ip: [192, 168, 1, 2],
            payload: Vec::new(),
        }
    }
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn tcp(mut self) -> Self {
        self.protocol = 6;
        self
    }

    pub fn udp(mut self) -> Self {
        self.protocol = 17;
        self
    }

    pub fn flags_fragment(mut self, value: u16) -> Self {
        self.flags_fragment = value;
        self
    }

    pub fn src_ip(mut self, ip: [u8; 4]) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn dst_ip(mut self, ip: [u8; 4]) -> Self {
        self.dst_ip = ip;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = 20 + self.payload.len() as u16;
        let mut packet = Vec::with_capacity(total_length as usize);

        packet.push(0x45); // Version 4, IHL 5
        packet.push(0x00);
        packet.extend_from_slice(&total_length.to_be_bytes());
        packet.extend_from_slice(&0x0001u16.to_be_bytes());
        packet.extend_from_slice(&self.flags_fragment.to_be_bytes());
        packet.push(self.ttl);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (not calculated)
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for constructing IPv6 packets.
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    next_header: u8,
    src_ip: [u8; 16],
    dst_ip: [u8; 16],
    payload: Vec<u8>,
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        let mut dst_ip = [0u8; 16];
        dst_ip[15] = 2;
        Self {
            next_header: 6,
            src_ip: [0u8; 16],
            dst_ip,
            payload: Vec::new(),
        }
    }
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_header(mut self, next_header: u8) -> Self {
        self.next_header = next_header;
        self
    }

    pub fn udp(self) -> Self {
        self.next_header(17)
    }

    pub fn src_ip(mut self, ip: [u8; 16]) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(40 + self.payload.len());
        packet.extend_from_slice(&[0x60, 0x00, 0x00, 0x00]); // Version 6, no class or label
        packet.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        packet.push(self.next_header);
        packet.push(64);
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for constructing TCP segments.
#[derive(Debug, Clone)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    flags: u8,
    payload: Vec<u8>,
}

impl Default for TcpBuilder {
    fn default() -> Self {
        Self {
            src_port: 12345,
            dst_port: 80,
            seq: 1,
            flags: 0x02, // SYN
            payload: Vec::new(),
        }
    }
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn ack(mut self) -> Self {
        self.flags = 0x10;
        self
    }

    pub fn psh_ack(mut self) -> Self {
        self.flags = 0x18;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut segment = Vec::with_capacity(20 + self.payload.len());
        segment.extend_from_slice(&self.src_port.to_be_bytes());
        segment.extend_from_slice(&self.dst_port.to_be_bytes());
        segment.extend_from_slice(&self.seq.to_be_bytes());
        segment.extend_from_slice(&0u32.to_be_bytes()); // Ack number
        segment.push(5 << 4); // Data offset, 20 bytes
        segment.push(self.flags);
        segment.extend_from_slice(&65535u16.to_be_bytes());
        segment.extend_from_slice(&[0x00, 0x00]); // Checksum
        segment.extend_from_slice(&[0x00, 0x00]); // Urgent pointer
        segment.extend_from_slice(&self.payload);
        segment
    }
}

/// Builder for constructing UDP datagrams.
#[derive(Debug, Clone)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl Default for UdpBuilder {
    fn default() -> Self {
        Self {
            src_port: 12345,
            dst_port: 53,
            payload: Vec::new(),
        }
    }
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dns(mut self) -> Self {
        self.dst_port = 53;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = 8 + self.payload.len() as u16;
        let mut datagram = Vec::with_capacity(length as usize);
        datagram.extend_from_slice(&self.src_port.to_be_bytes());
        datagram.extend_from_slice(&self.dst_port.to_be_bytes());
        datagram.extend_from_slice(&length.to_be_bytes());
        datagram.extend_from_slice(&[0x00, 0x00]); // Checksum
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}
