use thiserror::Error;

/// Defects in rule data. These surface while a catalog is being built,
/// never while a program is being analyzed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("parameter {parameter} references unknown parameter id {id}")]
    UnknownParameterId { id: i32, parameter: usize },

    #[error("duplicate rule '{name}'")]
    DuplicateRule { name: String },

    #[error("rule '{rule}' references unknown rule '{reference}'")]
    UnknownRuleReference { rule: String, reference: String },

    #[error("rule cycle detected: {path}")]
    RuleCycle { path: String },

    #[error("rule '{rule}': unknown value factory '{factory}'")]
    UnknownFactory { rule: String, factory: String },

    #[error("rule '{rule}': invalid {field} '{value}'")]
    InvalidValue {
        rule: String,
        field: String,
        value: String,
    },

    #[error("rule '{rule}': {message}")]
    InvalidDefinition { rule: String, message: String },
}

impl RuleError {
    pub fn unknown_parameter_id(id: i32, parameter: usize) -> Self {
        Self::UnknownParameterId { id, parameter }
    }

    pub fn duplicate_rule(name: impl Into<String>) -> Self {
        Self::DuplicateRule { name: name.into() }
    }

    pub fn unknown_rule_reference(rule: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnknownRuleReference {
            rule: rule.into(),
            reference: reference.into(),
        }
    }

    pub fn rule_cycle(path: &[String]) -> Self {
        Self::RuleCycle {
            path: path.join(" -> "),
        }
    }

    pub fn unknown_factory(rule: impl Into<String>, factory: impl Into<String>) -> Self {
        Self::UnknownFactory {
            rule: rule.into(),
            factory: factory.into(),
        }
    }

    pub fn invalid_value(
        rule: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            rule: rule.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn invalid_definition(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
