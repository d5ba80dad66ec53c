//! Calling conventions layered over [`Loads`](crate::Loads)
//!
//! - [`resource`]: namespace-bound loaders with preload and suspense reads
//! - [`status`]: the five-state view used by render-callback style consumers

pub mod resource;
pub mod status;
