//! Shared fixtures for payload shaping benches and tests.

pub mod bench_support;

pub use payload_shape;
