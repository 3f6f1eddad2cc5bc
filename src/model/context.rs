use std::collections::BTreeMap;
use std::fmt;

/// Open, library-specific refinements for context families without a closed kind.
pub type Properties = BTreeMap<String, String>;

labeled_enum! {
    pub enum ContextFamily {
        Cipher => "Cipher",
        Key => "Key",
        PrivateKey => "PrivateKey",
        PublicKey => "PublicKey",
        SecretKey => "SecretKey",
        Digest => "Digest",
        Signature => "Signature",
        Protocol => "Protocol",
        KeyAgreement => "KeyAgreement",
        KeyDerivationFunction => "KeyDerivationFunction",
        Mac => "Mac",
        Prng => "PRNG",
        AlgorithmParameter => "AlgorithmParameter",
    }
}

labeled_enum! {
    pub enum CipherKind {
        Rsa => "RSA",
        AesGcm => "AESGCM",
        Pbe => "PBE",
        Hash => "HASH",
        Aead => "AEAD",
        Block => "BLOCK_CIPHER",
        Stream => "STREAM_CIPHER",
        Wrap => "WRAP",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum KeyKind {
        Rsa => "RSA",
        Ec => "EC",
        Dsa => "DSA",
        Dh => "DH",
        Ed => "ED",
        Pbe => "PBE",
        Kdf => "KDF",
        Symmetric => "SYMMETRIC",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum DigestKind {
        Mgf1 => "MGF1",
        Hmac => "HMAC",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum SignatureKind {
        Rsa => "RSA",
        Dsa => "DSA",
        Ec => "EC",
        Ed => "ED",
        Pss => "PSS",
        Mgf1 => "MGF1",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum MacKind {
        Hmac => "HMAC",
        Cmac => "CMAC",
        Poly1305 => "POLY1305",
        Kmac => "KMAC",
        None => "NONE",
    }
}

labeled_enum! {
    pub enum ProtocolKind {
        Tls => "TLS",
        Ssh => "SSH",
        Ipsec => "IPSEC",
        None => "NONE",
    }
}

/// Classification stamped on every detection store.
///
/// Contexts are authored together with rules and never discovered: they say
/// what the matched construct is, the values say what was found in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetectionContext {
    Cipher(CipherKind),
    Key(KeyKind),
    PrivateKey(KeyKind),
    PublicKey(KeyKind),
    SecretKey(KeyKind),
    Digest(DigestKind),
    Signature(SignatureKind),
    Protocol(ProtocolKind),
    KeyAgreement(Properties),
    KeyDerivationFunction(Properties),
    Mac(MacKind),
    Prng(Properties),
    AlgorithmParameter(Properties),
}

impl DetectionContext {
    pub fn cipher() -> Self {
        Self::Cipher(CipherKind::None)
    }

    pub fn digest() -> Self {
        Self::Digest(DigestKind::None)
    }

    pub fn key_derivation() -> Self {
        Self::KeyDerivationFunction(Properties::new())
    }

    pub fn family(&self) -> ContextFamily {
        match self {
            Self::Cipher(_) => ContextFamily::Cipher,
            Self::Key(_) => ContextFamily::Key,
            Self::PrivateKey(_) => ContextFamily::PrivateKey,
            Self::PublicKey(_) => ContextFamily::PublicKey,
            Self::SecretKey(_) => ContextFamily::SecretKey,
            Self::Digest(_) => ContextFamily::Digest,
            Self::Signature(_) => ContextFamily::Signature,
            Self::Protocol(_) => ContextFamily::Protocol,
            Self::KeyAgreement(_) => ContextFamily::KeyAgreement,
            Self::KeyDerivationFunction(_) => ContextFamily::KeyDerivationFunction,
            Self::Mac(_) => ContextFamily::Mac,
            Self::Prng(_) => ContextFamily::Prng,
            Self::AlgorithmParameter(_) => ContextFamily::AlgorithmParameter,
        }
    }

    /// The refinement: a kind label, or `k=v` pairs for property-map families.
    pub fn kind_label(&self) -> String {
        match self {
            Self::Cipher(kind) => kind.as_str().to_string(),
            Self::Key(kind) | Self::PrivateKey(kind) | Self::PublicKey(kind) | Self::SecretKey(kind) => {
                kind.as_str().to_string()
            }
            Self::Digest(kind) => kind.as_str().to_string(),
            Self::Signature(kind) => kind.as_str().to_string(),
            Self::Protocol(kind) => kind.as_str().to_string(),
            Self::Mac(kind) => kind.as_str().to_string(),
            Self::KeyAgreement(props)
            | Self::KeyDerivationFunction(props)
            | Self::Prng(props)
            | Self::AlgorithmParameter(props) => props
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn properties(&self) -> Option<&Properties> {
        match self {
            Self::KeyAgreement(props)
            | Self::KeyDerivationFunction(props)
            | Self::Prng(props)
            | Self::AlgorithmParameter(props) => Some(props),
            _ => None,
        }
    }

    /// Builds a context from catalog data. `kind` is ignored for property-map
    /// families and `properties` for kind families; a missing kind means `NONE`.
    pub fn from_parts(family: &str, kind: Option<&str>, properties: Properties) -> Option<Self> {
        let family = ContextFamily::parse(family)?;
        let kind = kind.unwrap_or("NONE");

        let context = match family {
            ContextFamily::Cipher => Self::Cipher(CipherKind::parse(kind)?),
            ContextFamily::Key => Self::Key(KeyKind::parse(kind)?),
            ContextFamily::PrivateKey => Self::PrivateKey(KeyKind::parse(kind)?),
            ContextFamily::PublicKey => Self::PublicKey(KeyKind::parse(kind)?),
            ContextFamily::SecretKey => Self::SecretKey(KeyKind::parse(kind)?),
            ContextFamily::Digest => Self::Digest(DigestKind::parse(kind)?),
            ContextFamily::Signature => Self::Signature(SignatureKind::parse(kind)?),
            ContextFamily::Protocol => Self::Protocol(ProtocolKind::parse(kind)?),
            ContextFamily::Mac => Self::Mac(MacKind::parse(kind)?),
            ContextFamily::KeyAgreement => Self::KeyAgreement(properties),
            ContextFamily::KeyDerivationFunction => Self::KeyDerivationFunction(properties),
            ContextFamily::Prng => Self::Prng(properties),
            ContextFamily::AlgorithmParameter => Self::AlgorithmParameter(properties),
        };
        Some(context)
    }
}

impl fmt::Display for DetectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.family(), self.kind_label())
    }
}
