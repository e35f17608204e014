//! Macro for implementing Display and FromStr for wire-name enums
//!
//! Several SessionGuard enums travel as fixed lowercase strings (config
//! values, invalidation reasons handed to UI code, visibility states). This
//! macro gives each of them a matching `Display` and case-insensitive
//! `FromStr` from a single variant table.
//!
//! # Example
//!
//! ```rust
//! use sessionguard_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LoginMode {
//!     Direct,
//!     Centralized,
//! }
//!
//! impl_wire_name_conversions!(LoginMode {
//!     Direct => "direct",
//!     Centralized => "centralized",
//! });
//!
//! assert_eq!(LoginMode::Direct.to_string(), "direct");
//! assert_eq!("CENTRALIZED".parse::<LoginMode>(), Ok(LoginMode::Centralized));
//! ```

/// Implements Display and FromStr traits for wire-name enums
///
/// This macro generates:
/// - Display trait: writes the variant's wire name
/// - FromStr trait: parses case-insensitive strings to enum variants
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase wire
///   names
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Wire name of this variant.
            #[must_use]
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
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
