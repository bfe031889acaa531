//! HTTP transport

mod http;

pub use http::{router, run_http};
