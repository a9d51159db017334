//! Property-based tests for frame filtering.
//!
//! - Parallel evaluation returns the same ids as a sequential scan
//! - Results are ascending and within the requested range
//! - Compiling arbitrary input never panics

use std::sync::Arc;

use capflow_core::{compile, CaptureRecord, FilterPool, Frame, FrameStore, Layer, TokenRegistry};
use proptest::prelude::*;

const EXPRESSIONS: &[&str] = &[
    "tcp",
    "tcp.dst == 80",
    "tcp.dst != 80",
    "tcp.dst >= 1000 && tcp.len < 40",
    "!tcp || tcp.len == 0",
    "udp.dst == 53 || tcp.dst <= 22",
    "tcp.dst",
];

// (is_tcp, dst port, payload length)
fn frames_strategy() -> impl Strategy<Value = Vec<(bool, u16, u16)>> {
    prop::collection::vec((any::<bool>(), prop::sample::select(vec![22u16, 53, 80, 1000, 8080]), 0u16..64), 0..120)
}

fn build_store(tokens: &TokenRegistry, specs: &[(bool, u16, u16)]) -> Arc<FrameStore> {
    let store = Arc::new(FrameStore::new());
    for (i, (is_tcp, dst, len)) in specs.iter().enumerate() {
        let id = i as u64 + 1;
        let mut frame = Frame::new(id, CaptureRecord::new(tokens.get("[raw]"), vec![0u8; 4], 0));
        let name = if *is_tcp { "tcp" } else { "udp" };
        frame.push_root(
            Layer::new(tokens.get(name))
                .with_tag(tokens.get(name))
                .with_property(tokens.get(".dst"), *dst)
                .with_property(tokens.get(".len"), *len),
        );
        store.append(frame).unwrap();
    }
    store
}

#[test]
fn prop_parallel_matches_sequential() {
    proptest!(ProptestConfig::with_cases(48), |(
        specs in frames_strategy(),
        expr in prop::sample::select(EXPRESSIONS.to_vec()),
        workers in 1usize..9,
    )| {
        let tokens = TokenRegistry::new();
        let store = build_store(&tokens, &specs);
        let filter = compile(expr, &tokens).unwrap();

        let pool = FilterPool::new(Arc::clone(&store), workers);
        pool.start().unwrap();
        let end = specs.len() as u64 + 1;
        let parallel = pool.evaluate(&filter, 1..end).unwrap();
        pool.stop();

        let sequential: Vec<u64> = store
            .range(1..end)
            .iter()
            .filter(|f| filter.matches(f))
            .map(|f| f.id())
            .collect();
        prop_assert_eq!(parallel, sequential);
    });
}

#[test]
fn prop_results_within_range() {
    proptest!(ProptestConfig::with_cases(48), |(
        specs in frames_strategy(),
        start in 0u64..140,
        span in 0u64..140,
    )| {
        let tokens = TokenRegistry::new();
        let store = build_store(&tokens, &specs);
        let filter = compile("tcp || udp", &tokens).unwrap();

        let pool = FilterPool::new(store, 3);
        pool.start().unwrap();
        let ids = pool.evaluate(&filter, start..start + span).unwrap();
        pool.stop();

        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(ids.iter().all(|id| *id >= start && *id < start + span));
        prop_assert!(ids.iter().all(|id| *id >= 1 && *id <= specs.len() as u64));
    });
}

#[test]
fn prop_compile_never_panics() {
    proptest!(|(input in "[a-z@._()!&|=<>'\" 0-9-]{0,40}")| {
        let tokens = TokenRegistry::new();
        let _ = compile(&input, &tokens);
    });
}
