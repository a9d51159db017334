//! Built-in stream analyzers.

mod http;

pub use http::{HttpLineAnalyzer, HTTP_PORTS_OPTION};
