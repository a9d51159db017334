use std::fmt;

use compact_str::CompactString;

use crate::frame::{Layer, Value};
use crate::token::WellKnown;

/// One side of a flow: an address rendered as text plus a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub addr: CompactString,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: impl Into<CompactString>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.addr.contains(':') {
            write!(f, "[{}]:{}", self.addr, self.port)
        } else {
            write!(f, "{}:{}", self.addr, self.port)
        }
    }
}

/// Normalized flow key (lower endpoint first), so both directions of a
/// connection map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    lo: Endpoint,
    hi: Endpoint,
}

impl FlowKey {
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        if src <= dst {
            Self { lo: src, hi: dst }
        } else {
            Self { lo: dst, hi: src }
        }
    }

    /// Build the key for a stream layer.
    ///
    /// Ports come from the stream layer's `.src`/`.dst` properties, addresses
    /// from its parent's. Returns `None` when the stream layer has no ports.
    pub fn from_layer(layer: &Layer, parent: Option<&Layer>, wk: &WellKnown) -> Option<Self> {
        let (src, dst) = endpoints(layer, parent, wk)?;
        Some(Self::new(src, dst))
    }

    pub fn lo(&self) -> &Endpoint {
        &self.lo
    }

    pub fn hi(&self) -> &Endpoint {
        &self.hi
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.lo, self.hi)
    }
}

/// Source and destination endpoints of a stream layer.
pub(crate) fn endpoints(
    layer: &Layer,
    parent: Option<&Layer>,
    wk: &WellKnown,
) -> Option<(Endpoint, Endpoint)> {
    let src_port = layer.property(wk.src).and_then(Value::as_u16)?;
    let dst_port = layer.property(wk.dst).and_then(Value::as_u16)?;

    let addr = |id| -> CompactString {
        match parent.and_then(|p| p.property(id)) {
            Some(Value::Str(s)) => s.clone(),
            Some(other) => compact_str::format_compact!("{}", other),
            None => CompactString::default(),
        }
    };

    Some((
        Endpoint::new(addr(wk.src), src_port),
        Endpoint::new(addr(wk.dst), dst_port),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenRegistry;

    #[test]
    fn test_key_is_direction_independent() {
        let a = Endpoint::new("10.0.0.1", 54321);
        let b = Endpoint::new("10.0.0.2", 80);
        assert_eq!(FlowKey::new(a.clone(), b.clone()), FlowKey::new(b, a));
    }

    #[test]
    fn test_from_layer() {
        let tokens = TokenRegistry::new();
        let wk = *tokens.well_known();

        let ip = Layer::new(tokens.get("ipv4"))
            .with_property(wk.src, "10.0.0.2")
            .with_property(wk.dst, "10.0.0.1");
        let tcp = Layer::new(tokens.get("tcp"))
            .with_property(wk.src, 80u16)
            .with_property(wk.dst, 54321u16);

        let key = FlowKey::from_layer(&tcp, Some(&ip), &wk).unwrap();
        assert_eq!(key.lo(), &Endpoint::new("10.0.0.1", 54321));
        assert_eq!(key.hi(), &Endpoint::new("10.0.0.2", 80));
        assert_eq!(key.to_string(), "10.0.0.1:54321 <-> 10.0.0.2:80");
    }

    #[test]
    fn test_from_layer_without_ports() {
        let tokens = TokenRegistry::new();
        let wk = *tokens.well_known();
        let layer = Layer::new(tokens.get("tcp"));
        assert!(FlowKey::from_layer(&layer, None, &wk).is_none());
    }
}
