//! Dissector registry and layer tree building.

use std::sync::Arc;

use compact_str::{format_compact, CompactString};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::frame::{CaptureRecord, Frame, FrameId, Layer, Payload, Value};
use crate::token::TokenRegistry;

use super::{DissectContext, Dissector};

/// Ordered collection of dissectors.
#[derive(Default)]
pub struct DissectorRegistry {
    dissectors: Vec<Arc<dyn Dissector>>,
}

impl DissectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dissector. Dispatch follows registration order.
    pub fn register<D: Dissector + 'static>(&mut self, dissector: D) {
        self.dissectors.push(Arc::new(dissector));
    }

    pub fn register_arc(&mut self, dissector: Arc<dyn Dissector>) {
        self.dissectors.push(dissector);
    }

    pub fn len(&self) -> usize {
        self.dissectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dissectors.is_empty()
    }

    /// Get all registered dissector names.
    pub fn names(&self) -> Vec<&'static str> {
        self.dissectors.iter().map(|d| d.name()).collect()
    }

    /// Dissectors whose hints intersect the layer's tags, in registration order.
    pub fn matching<'a>(&'a self, layer: &'a Layer) -> impl Iterator<Item = &'a dyn Dissector> + 'a {
        self.dissectors
            .iter()
            .filter(move |d| layer.has_any_tag(d.hints()))
            .map(|d| d.as_ref())
    }

    /// Decode a captured record into a frame.
    ///
    /// Dissector failures never abort the frame: the failing layer is tagged
    /// `@error` and the frame keeps the first error message.
    pub fn dissect(
        &self,
        id: FrameId,
        record: CaptureRecord,
        tokens: &TokenRegistry,
        config: &SessionConfig,
    ) -> Frame {
        let wk = tokens.well_known();
        let mut root = Layer::new(record.link)
            .with_tag(record.link)
            .with_payload(Payload::new(wk.data).with_slice(record.data.clone()));

        let mut frame = Frame::new(id, record);
        let ctx = DissectContext {
            frame_id: id,
            timestamp_us: frame.timestamp_us(),
            depth: 0,
            tokens,
            config,
        };

        let mut error = None;
        self.dispatch(&mut root, ctx, &mut error);
        frame.push_root(root);
        if let Some(error) = error {
            frame.set_error(error);
        }
        frame
    }

    fn dispatch(
        &self,
        layer: &mut Layer,
        ctx: DissectContext<'_>,
        error: &mut Option<CompactString>,
    ) {
        if ctx.depth >= ctx.config.max_layer_depth {
            debug!(frame = ctx.frame_id, depth = ctx.depth, "layer depth limit reached");
            return;
        }

        let wk = ctx.tokens.well_known();
        let start = layer.children().len();
        for dissector in self.dissectors.iter() {
            if !layer.has_any_tag(dissector.hints()) {
                continue;
            }
            match dissector.analyze(&ctx, layer) {
                Ok(children) => {
                    for child in children {
                        layer.add_child(child);
                    }
                }
                Err(e) => {
                    warn!(
                        frame = ctx.frame_id,
                        dissector = dissector.name(),
                        error = %e,
                        "dissector failed"
                    );
                    layer.add_tag(wk.error);
                    layer.add_property(wk.error, Value::from(e.to_string()));
                    error.get_or_insert_with(|| format_compact!("{}: {}", dissector.name(), e));
                }
            }
        }

        let child_ctx = DissectContext {
            depth: ctx.depth + 1,
            ..ctx
        };
        for child in &mut layer.children_mut()[start..] {
            self.dispatch(child, child_ctx, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DissectError;
    use crate::token::Token;
    use bytes::Bytes;

    /// Emits one child layer `to` for every layer tagged `from`.
    struct Step {
        name: &'static str,
        hints: [Token; 1],
        to: Token,
    }

    impl Dissector for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        fn hints(&self) -> &[Token] {
            &self.hints
        }

        fn analyze(&self, _ctx: &DissectContext<'_>, _layer: &Layer) -> Result<Vec<Layer>, DissectError> {
            Ok(vec![Layer::new(self.to).with_tag(self.to)])
        }
    }

    struct Fails {
        hints: [Token; 1],
    }

    impl Dissector for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        fn hints(&self) -> &[Token] {
            &self.hints
        }

        fn analyze(&self, _ctx: &DissectContext<'_>, _layer: &Layer) -> Result<Vec<Layer>, DissectError> {
            Err(DissectError::Other("bad input".into()))
        }
    }

    fn record(link: Token) -> CaptureRecord {
        CaptureRecord::new(link, Bytes::from_static(b"raw"), 0)
    }

    #[test]
    fn test_chain_builds_tree() {
        let tokens = TokenRegistry::new();
        let (link, a, b) = (tokens.get("[test]"), tokens.get("a"), tokens.get("b"));

        let mut registry = DissectorRegistry::new();
        registry.register(Step { name: "a", hints: [link], to: a });
        registry.register(Step { name: "b", hints: [a], to: b });

        let frame = registry.dissect(1, record(link), &tokens, &SessionConfig::new());
        let ids: Vec<_> = frame.layers().map(|(l, _)| l.id).collect();
        assert_eq!(ids, vec![link, a, b]);
        assert!(frame.error().is_none());

        let root = &frame.roots()[0];
        let data = super::super::layer_data(root, tokens.well_known()).unwrap();
        assert_eq!(&data[..], b"raw");
    }

    #[test]
    fn test_all_matching_dissectors_run_in_order() {
        let tokens = TokenRegistry::new();
        let (link, a, b) = (tokens.get("[test]"), tokens.get("a"), tokens.get("b"));

        let mut registry = DissectorRegistry::new();
        registry.register(Step { name: "a", hints: [link], to: a });
        registry.register(Step { name: "b", hints: [link], to: b });

        let frame = registry.dissect(1, record(link), &tokens, &SessionConfig::new());
        let children: Vec<_> = frame.roots()[0].children().iter().map(|l| l.id).collect();
        assert_eq!(children, vec![a, b]);
        assert_eq!(registry.matching(&frame.roots()[0]).count(), 2);
    }

    #[test]
    fn test_failure_is_isolated() {
        let tokens = TokenRegistry::new();
        let (link, a, b) = (tokens.get("[test]"), tokens.get("a"), tokens.get("b"));
        let wk = tokens.well_known();

        let mut registry = DissectorRegistry::new();
        registry.register(Step { name: "a", hints: [link], to: a });
        registry.register(Fails { hints: [link] });
        registry.register(Step { name: "b", hints: [link], to: b });

        let frame = registry.dissect(1, record(link), &tokens, &SessionConfig::new());
        let root = &frame.roots()[0];
        assert!(root.has_tag(wk.error));
        assert_eq!(
            root.property(wk.error).and_then(Value::as_str),
            Some("bad input")
        );
        assert_eq!(root.children().len(), 2);
        assert_eq!(frame.error(), Some("fails: bad input"));
    }

    #[test]
    fn test_depth_limit_stops_self_triggering_chain() {
        let tokens = TokenRegistry::new();
        let link = tokens.get("[loop]");

        let mut registry = DissectorRegistry::new();
        registry.register(Step { name: "loop", hints: [link], to: link });

        let config = SessionConfig::new().with_max_layer_depth(5);
        let frame = registry.dissect(1, record(link), &tokens, &config);
        assert_eq!(frame.layers().count(), 6);
    }

    #[test]
    fn test_unknown_link_yields_root_only() {
        let tokens = TokenRegistry::new();
        let registry = DissectorRegistry::new();
        let frame = registry.dissect(7, record(tokens.get("[none]")), &tokens, &SessionConfig::new());
        assert_eq!(frame.id(), 7);
        assert_eq!(frame.layers().count(), 1);
    }
}
