//! # loadstate Domain
//!
//! Pure domain types for asynchronous load state management.
//!
//! This crate contains:
//! - The load lifecycle state machine ([`LoadState`], [`LoadEvent`]) and the
//!   five-state [`LoadStatus`] view
//! - Load policies deciding cache-versus-loader precedence
//! - [`LoadOptions`] configuration
//! - Logical key derivation
//! - The persisted record shape handed to cache providers
//! - Domain error types
//!
//! ## Architecture
//! - Depends only on `loadstate-common` foundation utilities
//! - No async runtime, no shared state

pub mod config;
pub mod constants;
pub mod errors;
pub mod key;
pub mod policy;
pub mod record;
pub mod state;

// Re-export commonly used items
pub use config::LoadOptions;
pub use errors::{LoadError, LoadResult, TransitionError};
pub use key::LoadKey;
pub use policy::LoadPolicy;
pub use record::PersistedRecord;
pub use state::{LoadEvent, LoadState, LoadStatus};
