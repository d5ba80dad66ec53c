//! Observability helpers
//!
//! Library code logs through `tracing` macros directly; this module only
//! owns subscriber setup.

pub mod logging;

pub use logging::{init_tracing, try_init_tracing, LogFormat};
