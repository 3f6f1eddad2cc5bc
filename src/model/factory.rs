//! Value factories: pure conversions from a resolved literal to a value kind.
//!
//! The engine owns locations, so factories only ever see the literal and
//! return the payload; the engine pairs it with the node the literal was
//! resolved at.

use std::fmt;

use super::value::{
    CipherAction, KeyAction, ParameterKind, SignatureAction, SizeKind, SizeUnit, ValueKind,
};

/// A constant a parameter expression was traced back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
}

impl Literal {
    pub fn as_text(&self) -> Option<String> {
        match self {
            Literal::Str(s) => Some(s.clone()),
            Literal::Int(i) => Some(i.to_string()),
            Literal::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Str(_) => "str",
            Literal::Int(_) => "int",
            Literal::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Bytes(bytes) => write!(f, "b[{} bytes]", bytes.len()),
        }
    }
}

pub trait ValueFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// `None` means the literal does not characterize this value; it is not an error.
    fn apply(&self, literal: &Literal) -> Option<ValueKind>;
}

fn named(fixed: &Option<String>, literal: &Literal) -> Option<String> {
    if let Some(name) = fixed {
        return Some(name.clone());
    }
    match literal {
        Literal::Str(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

macro_rules! named_factory {
    ($(#[$meta:meta])* $factory:ident, $variant:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $factory {
            fixed: Option<String>,
        }

        impl $factory {
            pub fn new() -> Self {
                Self::default()
            }

            /// Always produces `name`, whatever was resolved.
            pub fn fixed(name: impl Into<String>) -> Self {
                Self {
                    fixed: Some(name.into()),
                }
            }
        }

        impl ValueFactory for $factory {
            fn name(&self) -> &'static str {
                $label
            }

            fn apply(&self, literal: &Literal) -> Option<ValueKind> {
                named(&self.fixed, literal).map(ValueKind::$variant)
            }
        }
    };
}

named_factory!(
    /// Algorithm names, from a string literal or the matched member name.
    AlgorithmFactory,
    Algorithm,
    "algorithm"
);
named_factory!(ModeFactory, Mode, "mode");
named_factory!(PaddingFactory, Padding, "padding");
named_factory!(CurveFactory, Curve, "curve");

/// Sizes, converted to bits according to the rule author's chosen unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFactory {
    kind: SizeKind,
    unit: SizeUnit,
}

impl SizeFactory {
    pub fn new(kind: SizeKind, unit: SizeUnit) -> Self {
        Self { kind, unit }
    }

    pub fn key_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Key, unit)
    }

    pub fn block_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Block, unit)
    }

    pub fn digest_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Digest, unit)
    }

    pub fn salt_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Salt, unit)
    }

    pub fn password_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Password, unit)
    }

    pub fn tag_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Tag, unit)
    }

    pub fn nonce_size(unit: SizeUnit) -> Self {
        Self::new(SizeKind::Nonce, unit)
    }
}

impl ValueFactory for SizeFactory {
    fn name(&self) -> &'static str {
        "size"
    }

    fn apply(&self, literal: &Literal) -> Option<ValueKind> {
        size_in_bits(literal, self.unit).map(|bits| ValueKind::Size {
            kind: self.kind,
            bits,
            unit: self.unit,
        })
    }
}

pub fn size_in_bits(literal: &Literal, unit: SizeUnit) -> Option<u64> {
    match (unit, literal) {
        (SizeUnit::Byte, Literal::Int(n)) => u64::try_from(*n).ok()?.checked_mul(8),
        // key material given as text or raw bytes: its length is the size
        (SizeUnit::Byte, Literal::Str(s)) => (s.len() as u64).checked_mul(8),
        (SizeUnit::Byte, Literal::Bytes(b)) => (b.len() as u64).checked_mul(8),
        (SizeUnit::Bit, Literal::Int(n)) => u64::try_from(*n).ok(),
        (SizeUnit::Bit, Literal::Str(s)) => s.trim().parse::<u64>().ok(),
        (SizeUnit::Bit, Literal::Bytes(_)) => None,
        (SizeUnit::PrimeP, Literal::Int(n)) if *n > 0 => Some(u64::from(64 - n.leading_zeros())),
        (SizeUnit::PrimeP, Literal::Int(_)) => None,
        (SizeUnit::PrimeP, Literal::Str(s)) => big_integer_bit_length(s),
        (SizeUnit::PrimeP, Literal::Bytes(b)) => bytes_bit_length(b),
    }
}

/// Bit length of a non-negative integer written in decimal or `0x` hex.
pub fn big_integer_bit_length(text: &str) -> Option<u64> {
    let text = text.trim().trim_start_matches('+').replace('_', "");
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return hex_bit_length(hex);
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = text.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    if let Ok(small) = digits.parse::<u128>() {
        return Some(u64::from(128 - small.leading_zeros()));
    }

    // long division by two over the decimal digits, one bit per pass
    let mut number: Vec<u8> = digits.bytes().map(|b| b - b'0').collect();
    let mut bits = 0u64;
    while !number.is_empty() {
        let mut remainder = 0u8;
        for digit in number.iter_mut() {
            let current = remainder * 10 + *digit;
            *digit = current / 2;
            remainder = current % 2;
        }
        let leading = number.iter().take_while(|d| **d == 0).count();
        number.drain(..leading);
        bits += 1;
    }
    Some(bits)
}

fn hex_bit_length(hex: &str) -> Option<u64> {
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.trim_start_matches('0');
    let Some(first) = hex.chars().next() else {
        return Some(0);
    };
    let first = first.to_digit(16)?;
    Some((hex.len() as u64 - 1) * 4 + u64::from(32 - first.leading_zeros()))
}

fn bytes_bit_length(bytes: &[u8]) -> Option<u64> {
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let Some(first) = significant.first() else {
        return Some(0);
    };
    Some((significant.len() as u64 - 1) * 8 + u64::from(8 - first.leading_zeros()))
}

/// Operation mode codes such as `Cipher.ENCRYPT_MODE` (1) or a mode keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationModeFactory;

impl ValueFactory for OperationModeFactory {
    fn name(&self) -> &'static str {
        "operation_mode"
    }

    fn apply(&self, literal: &Literal) -> Option<ValueKind> {
        match literal {
            Literal::Int(code) => Some(ValueKind::OperationMode(code.to_string())),
            Literal::Str(s) if !s.trim().is_empty() => {
                Some(ValueKind::OperationMode(s.trim().to_string()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherActionFactory(pub CipherAction);

impl ValueFactory for CipherActionFactory {
    fn name(&self) -> &'static str {
        "cipher_action"
    }

    fn apply(&self, _literal: &Literal) -> Option<ValueKind> {
        Some(ValueKind::CipherAction(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyActionFactory(pub KeyAction);

impl ValueFactory for KeyActionFactory {
    fn name(&self) -> &'static str {
        "key_action"
    }

    fn apply(&self, _literal: &Literal) -> Option<ValueKind> {
        Some(ValueKind::KeyAction(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureActionFactory(pub SignatureAction);

impl ValueFactory for SignatureActionFactory {
    fn name(&self) -> &'static str {
        "signature_action"
    }

    fn apply(&self, _literal: &Literal) -> Option<ValueKind> {
        Some(ValueKind::SignatureAction(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmParameterFactory(pub ParameterKind);

impl ValueFactory for AlgorithmParameterFactory {
    fn name(&self) -> &'static str {
        "algorithm_parameter"
    }

    fn apply(&self, literal: &Literal) -> Option<ValueKind> {
        literal.as_text().map(|text| ValueKind::AlgorithmParameter {
            kind: self.0,
            text,
        })
    }
}
