//! # loadstate Core
//!
//! Request-state and record cache management for asynchronous data loading.
//!
//! This crate contains:
//! - The shared [`RecordStore`] with TTL eviction and an optional
//!   [`CacheProvider`] mirror
//! - The load policy evaluator and dedup window
//! - The invocation controller [`Loads`], which runs user loaders, tracks
//!   their lifecycle and guards against stale writes
//! - The optimistic update path, revalidation triggers and suspense reads
//! - Resource/preload and five-state status adapters
//!
//! ## Architecture Principles
//! - Stores are explicitly constructed and injected; there is no global state
//! - Loaders are opaque async functions supplied by the caller
//! - Persistence backends are reached only through the [`CacheProvider`] port
//!
//! ## Example
//!
//! ```no_run
//! use loadstate_core::{Loader, Loads, RecordStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store: RecordStore<String, String> = RecordStore::new();
//! let user = Loads::builder(
//!     store.clone(),
//!     Loader::new(|id: u32| async move { Ok::<_, String>(format!("user {id}")) }),
//! )
//! .context("user")
//! .variables(7)
//! .build()?;
//!
//! user.load().await?;
//! assert_eq!(user.snapshot().response.as_deref(), Some("user 7"));
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod controller;
pub mod dedup;
pub mod loader;
pub mod optimistic;
pub mod policy;
pub mod ports;
pub mod revalidate;
pub mod store;
pub mod suspense;

// Re-export specific items to avoid ambiguity
pub use adapters::resource::{preload, Resource};
pub use adapters::status::StatusView;
pub use controller::{LoadOutcome, Loads, LoadsBuilder, LoadsSnapshot};
pub use loader::{LoadArgs, Loader, LoaderMeta, Variables};
pub use optimistic::{Optimistic, OptimisticTarget};
pub use policy::{evaluate, PolicyDecision};
pub use ports::{CacheProvider, ProviderRead};
pub use revalidate::RevalidateTrigger;
pub use store::memory::MemoryCacheProvider;
pub use store::{
    InFlight, Payload, Record, RecordPatch, RecordStore, RecordStoreBuilder, SetOptions,
    StoreEvent, StoreStats, StoreSubscription, SubscriberId,
};
pub use suspense::{SuspendHandle, Suspended};
