use std::fmt;

labeled_enum! {
    /// How a raw numeric value was interpreted before conversion to bits.
    pub enum SizeUnit {
        Byte => "BYTE",
        Bit => "BIT",
        PrimeP => "PRIME_P",
    }
}

labeled_enum! {
    pub enum SizeKind {
        Key => "KeySize",
        Block => "BlockSize",
        Digest => "DigestSize",
        Salt => "SaltSize",
        Password => "PasswordSize",
        Tag => "TagSize",
        Nonce => "NonceSize",
    }
}

labeled_enum! {
    pub enum CipherAction {
        Wrap => "WRAP",
        Hash => "HASH",
        Encrypt => "ENCRYPT",
        Decrypt => "DECRYPT",
        Padding => "PADDING",
        Mac => "MAC",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum KeyAction {
        Generation => "GENERATION",
        Kdf => "KDF",
    }
}

labeled_enum! {
    pub enum SignatureAction {
        Sign => "SIGN",
        Verify => "VERIFY",
        Padding => "PADDING",
    }
}

labeled_enum! {
    /// Named domain/algorithm parameters (EC/DSA domain values, iteration counts).
    pub enum ParameterKind {
        Any => "ANY",
        N => "N",
        A => "A",
        B => "B",
        P => "P",
        M => "M",
        Iterations => "ITERATIONS",
    }
}

/// Payload of a detected value, without its location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Algorithm(String),
    Size {
        kind: SizeKind,
        bits: u64,
        unit: SizeUnit,
    },
    Mode(String),
    Padding(String),
    Curve(String),
    OperationMode(String),
    CipherAction(CipherAction),
    KeyAction(KeyAction),
    SignatureAction(SignatureAction),
    AlgorithmParameter {
        kind: ParameterKind,
        text: String,
    },
}

impl ValueKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueKind::Algorithm(_) => "Algorithm",
            ValueKind::Size { kind, .. } => kind.as_str(),
            ValueKind::Mode(_) => "Mode",
            ValueKind::Padding(_) => "Padding",
            ValueKind::Curve(_) => "Curve",
            ValueKind::OperationMode(_) => "OperationMode",
            ValueKind::CipherAction(_) => "CipherAction",
            ValueKind::KeyAction(_) => "KeyAction",
            ValueKind::SignatureAction(_) => "SignatureAction",
            ValueKind::AlgorithmParameter { .. } => "AlgorithmParameter",
        }
    }

    pub fn unit(&self) -> Option<SizeUnit> {
        match self {
            ValueKind::Size { unit, .. } => Some(*unit),
            _ => None,
        }
    }

    pub fn parameter_kind(&self) -> Option<ParameterKind> {
        match self {
            ValueKind::AlgorithmParameter { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Algorithm(name)
            | ValueKind::Mode(name)
            | ValueKind::Padding(name)
            | ValueKind::Curve(name)
            | ValueKind::OperationMode(name) => f.write_str(name),
            ValueKind::Size { bits, .. } => write!(f, "{bits}"),
            ValueKind::CipherAction(action) => f.write_str(action.as_str()),
            ValueKind::KeyAction(action) => f.write_str(action.as_str()),
            ValueKind::SignatureAction(action) => f.write_str(action.as_str()),
            ValueKind::AlgorithmParameter { text, .. } => f.write_str(text),
        }
    }
}

/// A fact found in the analyzed program: a value kind plus where it came from.
///
/// Two values are the same fact when payload and location are both equal,
/// which is what store and hook deduplication rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetectedValue<L> {
    kind: ValueKind,
    location: L,
}

impl<L> DetectedValue<L> {
    pub fn new(kind: ValueKind, location: L) -> Self {
        Self { kind, location }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn into_parts(self) -> (ValueKind, L) {
        (self.kind, self.location)
    }
}

impl<L> fmt::Display for DetectedValue<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}
