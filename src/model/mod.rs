//! Detection value model.
//!
//! - `value`: the closed set of detected value kinds and their locations
//! - `factory`: conversions from resolved literals to detected values
//! - `context`: the semantic category stamped on every detection

/// Declares a closed, fieldless enum with a canonical upper-case label.
///
/// Labels are what the diagnostics printer and the report emit, and what
/// catalog files use (matched case-insensitively).
macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                let wanted = s.trim().replace(['-', '_'], "");
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().replace('_', "").eq_ignore_ascii_case(&wanted))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod context;
pub mod factory;
pub mod value;

pub use context::{
    CipherKind, ContextFamily, DetectionContext, DigestKind, KeyKind, MacKind, Properties,
    ProtocolKind, SignatureKind,
};
pub use factory::{
    AlgorithmFactory, AlgorithmParameterFactory, CipherActionFactory, CurveFactory,
    KeyActionFactory, Literal, ModeFactory, OperationModeFactory, PaddingFactory,
    SignatureActionFactory, SizeFactory, ValueFactory,
};
pub use value::{
    CipherAction, DetectedValue, KeyAction, ParameterKind, SignatureAction, SizeKind, SizeUnit,
    ValueKind,
};
