// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Declarative helper for closed vendor enumerations with stable integer values.

/// Define a closed enum whose variants carry a fixed vendor integer and the
/// vendor's constant name.
///
/// Generates `ALL`, `raw()`, `from_raw()` and `vendor_name()`. Values must not be
/// renumbered once published, so they are spelled out at the call site.
macro_rules! vendor_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $raw:expr => $vendor:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in vendor declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The integer the engine uses for this value.
            pub const fn raw(self) -> i32 {
                match self {
                    $($name::$variant => $raw,)+
                }
            }

            /// Resolve an engine integer. Unknown values yield `None`.
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $(r if r == $raw => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// The vendor's constant name (e.g. `READER_ENABLED`).
            pub const fn vendor_name(self) -> &'static str {
                match self {
                    $($name::$variant => $vendor,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.vendor_name())
            }
        }
    };
}
