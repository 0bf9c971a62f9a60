//! Benchmarks for txloop.
//!
//! Run with `cargo bench -p txloop_bench`.

pub mod utils;
