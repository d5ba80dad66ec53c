//! Common utility functions and helper macros
//!
//! - **[`macros`]**: string conversions for lifecycle enums
//! - **[`serde`]**: serialization helpers for durations

#[macro_use]
pub mod macros;
pub mod serde;

pub use self::serde::{duration_millis, option_duration_millis};
