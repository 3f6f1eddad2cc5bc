//! On-disk catalog format, shared by the YAML and JSON loaders.
//!
//! ```yaml
//! version: "1"
//! bundle: python-cryptography
//! rules:
//!   - id: cryptography.pbkdf2
//!     object_types: [cryptography.hazmat.primitives.kdf.pbkdf2.PBKDF2HMAC]
//!     constructor: true
//!     detect: { factory: algorithm, value: PBKDF2 }
//!     parameters:
//!       - { keyword: algorithm, rules: [cryptography.hash_algorithm] }
//!       - { keyword: length, detect: { factory: size, kind: key_size, unit: BYTE } }
//!     context: { family: KeyDerivationFunction, properties: { algorithm: PBKDF2 } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::ANY_TYPE;

fn default_version() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

fn any_type() -> String {
    ANY_TYPE.to_string()
}

fn match_level() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default = "default_version")]
    pub version: String,
    /// Bundle for rules that do not name their own.
    #[serde(default)]
    pub bundle: Option<String>,
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub id: String,
    /// Entry rules are tried on every visited site; the others are only
    /// reachable as nested or dependent rules.
    #[serde(default = "default_true")]
    pub entry: bool,
    #[serde(default)]
    pub bundle: Option<String>,
    pub object_types: Vec<String>,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub constructor: bool,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub detect: Option<FactoryDef>,
    #[serde(default)]
    pub parameters: ParametersDef,
    pub context: ContextDef,
    #[serde(default)]
    pub hooks: Vec<HookDef>,
    #[serde(default)]
    pub dependent_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterShape {
    Any,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParametersDef {
    Shape(ParameterShape),
    List(Vec<ParameterDef>),
}

impl Default for ParametersDef {
    fn default() -> Self {
        Self::Shape(ParameterShape::Any)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDef {
    #[serde(rename = "type", default = "any_type")]
    pub ty: String,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub detect: Option<FactoryDef>,
    /// Slot id (`-1` for the match level) to move this parameter's values under.
    #[serde(default)]
    pub reparent_to: Option<i32>,
    #[serde(default)]
    pub context: Option<ContextDef>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FactoryDef {
    pub factory: String,
    /// Fixed name for algorithm, mode, padding and curve factories.
    #[serde(default)]
    pub value: Option<String>,
    /// Size unit: `BYTE`, `BIT` or `PRIME_P`.
    #[serde(default)]
    pub unit: Option<String>,
    /// Size kind (`key_size`, `salt_size`, ...) or algorithm parameter kind.
    #[serde(default)]
    pub kind: Option<String>,
    /// Label for the action factories.
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextDef {
    pub family: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerDef {
    Invocation {
        method: String,
    },
    EnumConstant {
        #[serde(default)]
        class: Option<String>,
        identifier: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HookDef {
    #[serde(flatten)]
    pub trigger: TriggerDef,
    pub detect: FactoryDef,
    #[serde(default = "match_level")]
    pub slot: i32,
    /// Root hooks also fire for matching sites visited before the rule matched.
    #[serde(default = "default_true")]
    pub root: bool,
}
