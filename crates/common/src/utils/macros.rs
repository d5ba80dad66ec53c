//! Macros for reducing boilerplate code
//!
//! Lifecycle enums (load states, load policies, render statuses) all carry a
//! stable string form used for logging, configuration and persistence. The
//! macro below keeps those forms in one place per enum.

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a fieldless enum
///
/// This macro generates:
/// - `as_str()`: the canonical string form of a variant
/// - `ALL`: every variant in declaration order
/// - `Display`: writes the canonical string form
/// - `FromStr`: case-insensitive parsing of the canonical string form
///
/// # Example
///
/// ```rust
/// use loadstate_common::impl_state_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum Phase {
///     Idle,
///     InFlight,
/// }
///
/// impl_state_conversions!(Phase {
///     Idle => "idle",
///     InFlight => "in-flight",
/// });
///
/// assert_eq!(Phase::InFlight.to_string(), "in-flight");
/// assert_eq!("IDLE".parse::<Phase>(), Ok(Phase::Idle));
/// ```
#[macro_export]
macro_rules! impl_state_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$enum_name] = &[$(Self::$variant),+];

            /// Canonical string form of this variant
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
