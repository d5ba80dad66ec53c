//! Domain constants
//!
//! Centralized defaults for load options and key derivation.

/// Window after an invocation starts during which a second load for the same
/// key reuses the in-flight result.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 500;

/// Default delay before a pending state becomes visible.
pub const DEFAULT_DELAY_MS: u64 = 0;

/// Separator between the context and the serialized arguments in a key.
pub const KEY_SEPARATOR: char = '.';
