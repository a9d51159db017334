//! Layers, payloads and properties.

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;

use super::Value;
use crate::token::Token;

/// Named value attached to a layer or payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub id: Token,
    pub value: Value,
}

impl Property {
    pub fn new(id: Token, value: impl Into<Value>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Typed, ordered list of byte views.
///
/// Slices are reference-counted views into the capture buffer they came from,
/// so a payload never outlives its backing bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub kind: Token,
    slices: SmallVec<[Bytes; 2]>,
    properties: Vec<Property>,
}

impl Payload {
    pub fn new(kind: Token) -> Self {
        Self {
            kind,
            slices: SmallVec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_slice(mut self, slice: Bytes) -> Self {
        self.add_slice(slice);
        self
    }

    /// Empty slices are not recorded.
    pub fn add_slice(&mut self, slice: Bytes) {
        if !slice.is_empty() {
            self.slices.push(slice);
        }
    }

    pub fn slices(&self) -> &[Bytes] {
        &self.slices
    }

    /// Total bytes across all slices.
    pub fn len(&self) -> usize {
        self.slices.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Contiguous view of the payload. Zero-copy for single-slice payloads.
    pub fn contiguous(&self) -> Bytes {
        match self.slices.as_slice() {
            [] => Bytes::new(),
            [only] => only.clone(),
            many => {
                let mut buf = BytesMut::with_capacity(self.len());
                for slice in many {
                    buf.extend_from_slice(slice);
                }
                buf.freeze()
            }
        }
    }

    pub fn add_property(&mut self, id: Token, value: impl Into<Value>) {
        self.properties.push(Property::new(id, value));
    }

    pub fn property(&self, id: Token) -> Option<&Value> {
        self.properties.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
}

/// Decoded protocol unit within a frame.
///
/// Layers form a tree: each layer exclusively owns its children.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: Token,
    properties: Vec<Property>,
    children: Vec<Layer>,
    tags: SmallVec<[Token; 4]>,
    payloads: Vec<Payload>,
}

impl Layer {
    pub fn new(id: Token) -> Self {
        Self {
            id,
            properties: Vec::new(),
            children: Vec::new(),
            tags: SmallVec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: Token) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_property(mut self, id: Token, value: impl Into<Value>) -> Self {
        self.add_property(id, value);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.add_payload(payload);
        self
    }

    /// Tags are a set; adding an existing tag is a no-op.
    pub fn add_tag(&mut self, tag: Token) {
        if !self.has_tag(tag) {
            self.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: Token) -> bool {
        self.tags.contains(&tag)
    }

    /// True if any of `hints` is among this layer's tags.
    pub fn has_any_tag(&self, hints: &[Token]) -> bool {
        hints.iter().any(|hint| self.has_tag(*hint))
    }

    pub fn tags(&self) -> &[Token] {
        &self.tags
    }

    pub fn add_property(&mut self, id: Token, value: impl Into<Value>) {
        self.properties.push(Property::new(id, value));
    }

    /// First property with the given id.
    pub fn property(&self, id: Token) -> Option<&Value> {
        self.properties.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn add_payload(&mut self, payload: Payload) {
        self.payloads.push(payload);
    }

    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    pub fn payloads_of(&self, kind: Token) -> impl Iterator<Item = &Payload> + '_ {
        self.payloads.iter().filter(move |p| p.kind == kind)
    }

    /// Append a child and return a handle to it.
    pub fn add_child(&mut self, child: Layer) -> &mut Layer {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn children(&self) -> &[Layer] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Layer] {
        &mut self.children
    }

    /// Deepest layer along the last-child chain.
    pub fn top_mut(&mut self) -> &mut Layer {
        let mut layer = self;
        while !layer.children.is_empty() {
            let last = layer.children.len() - 1;
            layer = &mut layer.children[last];
        }
        layer
    }

    /// Depth-first, pre-order traversal of this layer and its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(self, None)],
        }
    }

    /// First layer (pre-order) with the given id.
    pub fn find(&self, id: Token) -> Option<&Layer> {
        self.walk().map(|(layer, _)| layer).find(|l| l.id == id)
    }
}

/// Pre-order iterator over a layer tree, yielding each layer with its parent.
pub struct Walk<'a> {
    stack: Vec<(&'a Layer, Option<&'a Layer>)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn over(roots: &'a [Layer]) -> Self {
        Self {
            stack: roots.iter().rev().map(|root| (root, None)).collect(),
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a Layer, Option<&'a Layer>);

    fn next(&mut self) -> Option<Self::Item> {
        let (layer, parent) = self.stack.pop()?;
        self.stack
            .extend(layer.children.iter().rev().map(|child| (child, Some(layer))));
        Some((layer, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenRegistry;

    #[test]
    fn test_tags_are_a_set() {
        let tokens = TokenRegistry::new();
        let tcp = tokens.get("tcp");
        let mut layer = Layer::new(tcp).with_tag(tcp);
        layer.add_tag(tcp);
        assert_eq!(layer.tags(), &[tcp]);
        assert!(layer.has_any_tag(&[tokens.get("udp"), tcp]));
    }

    #[test]
    fn test_walk_is_preorder_with_parents() {
        let tokens = TokenRegistry::new();
        let (a, b, c, d) = (
            tokens.get("a"),
            tokens.get("b"),
            tokens.get("c"),
            tokens.get("d"),
        );

        let mut root = Layer::new(a);
        root.add_child(Layer::new(b)).add_child(Layer::new(c));
        root.add_child(Layer::new(d));

        let order: Vec<_> = root
            .walk()
            .map(|(layer, parent)| (layer.id, parent.map(|p| p.id)))
            .collect();
        assert_eq!(
            order,
            vec![(a, None), (b, Some(a)), (c, Some(b)), (d, Some(a))]
        );
        assert_eq!(root.find(c).map(|l| l.id), Some(c));
    }

    #[test]
    fn test_top_follows_last_child() {
        let tokens = TokenRegistry::new();
        let (a, b, c, d) = (
            tokens.get("a"),
            tokens.get("b"),
            tokens.get("c"),
            tokens.get("d"),
        );

        let mut root = Layer::new(a);
        root.add_child(Layer::new(b)).add_child(Layer::new(c));
        assert_eq!(root.top_mut().id, c);

        root.add_child(Layer::new(d));
        assert_eq!(root.top_mut().id, d);
    }

    #[test]
    fn test_payload_contiguous() {
        let tokens = TokenRegistry::new();
        let mut payload = Payload::new(tokens.well_known().reassembled);
        payload.add_slice(Bytes::from_static(b"GET /"));
        payload.add_slice(Bytes::new());
        payload.add_slice(Bytes::from_static(b" HTTP/1.1"));

        assert_eq!(payload.slices().len(), 2);
        assert_eq!(payload.len(), 14);
        assert_eq!(&payload.contiguous()[..], b"GET / HTTP/1.1");
    }
}
