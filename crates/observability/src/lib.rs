//! Process-wide tracing setup.
//!
//! Library crates only emit events through `tracing`; binaries and test
//! harnesses call [`init`] once at startup to decide where they go.

pub mod tracing;

pub use crate::tracing::{init, init_with_filter};
