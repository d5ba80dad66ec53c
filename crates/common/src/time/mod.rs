//! Time utilities
//!
//! - [`clock`]: injectable time source (`SystemClock`, `MockClock`)
//! - [`timer`]: cancelable one-shot and recurring tokio timers

pub mod clock;
#[cfg(feature = "runtime")]
pub mod timer;

pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use timer::{recurring, schedule, TimerHandle};
