use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::RuleError;
use crate::hooks::{EnumConstant, HookSpec, HookTrigger};
use crate::model::{
    AlgorithmFactory, AlgorithmParameterFactory, CipherAction, CipherActionFactory, CurveFactory,
    DetectionContext, KeyAction, KeyActionFactory, ModeFactory, OperationModeFactory,
    PaddingFactory, ParameterKind, SignatureAction, SignatureActionFactory, SizeFactory, SizeKind,
    SizeUnit, ValueFactory,
};
use crate::rules::{DetectionRule, Member, Parameters, RuleBuilder, Slot};

use super::schema::{
    CatalogFile, ContextDef, FactoryDef, HookDef, ParameterDef, ParameterShape, ParametersDef,
    RuleDef, TriggerDef,
};

pub(super) const DEFAULT_BUNDLE: &str = "default";

/// A compiled catalog entry, in file order.
pub(super) struct CompiledRule {
    pub id: String,
    pub entry: bool,
    pub rule: Arc<DetectionRule>,
}

/// Turns rule definitions into shared rule graphs. References are resolved
/// by id in any order; a rule referenced from several places is built once
/// and shared.
pub(super) struct Compiler<'a> {
    definitions: HashMap<&'a str, &'a RuleDef>,
    default_bundle: &'a str,
    compiled: HashMap<String, Arc<DetectionRule>>,
    in_progress: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn compile(file: &'a CatalogFile) -> Result<Vec<CompiledRule>, RuleError> {
        let mut definitions = HashMap::with_capacity(file.rules.len());
        for def in &file.rules {
            if definitions.insert(def.id.as_str(), def).is_some() {
                return Err(RuleError::duplicate_rule(&def.id));
            }
        }

        let mut compiler = Compiler {
            definitions,
            default_bundle: file.bundle.as_deref().unwrap_or(DEFAULT_BUNDLE),
            compiled: HashMap::new(),
            in_progress: Vec::new(),
        };

        file.rules
            .iter()
            .map(|def| {
                let rule = compiler.rule(&def.id, None)?;
                Ok(CompiledRule {
                    id: def.id.clone(),
                    entry: def.entry,
                    rule,
                })
            })
            .collect()
    }

    fn rule(&mut self, id: &str, referrer: Option<&str>) -> Result<Arc<DetectionRule>, RuleError> {
        if let Some(rule) = self.compiled.get(id) {
            return Ok(Arc::clone(rule));
        }
        if let Some(start) = self.in_progress.iter().position(|open| open == id) {
            let mut path = self.in_progress[start..].to_vec();
            path.push(id.to_string());
            return Err(RuleError::rule_cycle(&path));
        }
        let def = *self.definitions.get(id).ok_or_else(|| {
            RuleError::unknown_rule_reference(referrer.unwrap_or(id), id)
        })?;

        self.in_progress.push(id.to_string());
        let built = self.build(def);
        self.in_progress.pop();

        let rule = built?;
        trace!(rule = id, "compiled rule");
        self.compiled.insert(id.to_string(), Arc::clone(&rule));
        Ok(rule)
    }

    fn rules(&mut self, ids: &[String], referrer: &str) -> Result<Vec<Arc<DetectionRule>>, RuleError> {
        ids.iter().map(|id| self.rule(id, Some(referrer))).collect()
    }

    fn build(&mut self, def: &RuleDef) -> Result<Arc<DetectionRule>, RuleError> {
        let id = def.id.as_str();
        if def.object_types.is_empty() {
            return Err(RuleError::invalid_definition(id, "object_types must not be empty"));
        }
        if def.constructor == !def.methods.is_empty() {
            return Err(RuleError::invalid_definition(
                id,
                "declare either `constructor: true` or a non-empty `methods` list",
            ));
        }

        let start = DetectionRule::named(id);
        let types = def.object_types.iter().map(String::as_str);
        let typed = if def.exact {
            start.for_object_exact_types(types)
        } else {
            start.for_object_types(types)
        };
        let mut member = if def.constructor {
            typed.for_constructor()
        } else {
            typed.for_methods(def.methods.iter().map(String::as_str))
        };
        if let Some(detect) = &def.detect {
            member = member.should_be_detected_as_shared(factory(id, detect)?);
        }

        let context = context(id, &def.context)?;
        let contextual = match &def.parameters {
            ParametersDef::Shape(ParameterShape::Any) => {
                member.with_any_parameters().build_for_context(context)
            }
            ParametersDef::Shape(ParameterShape::None) => {
                member.without_parameters().build_for_context(context)
            }
            ParametersDef::List(list) => match list.split_first() {
                None => member.without_parameters().build_for_context(context),
                Some((first, rest)) => {
                    let mut parameters = self.parameter(open_parameters(member, first), first, id)?;
                    for def in rest {
                        let next = match &def.keyword {
                            Some(keyword) => parameters.with_keyword_parameter(keyword, &def.ty),
                            None => parameters.with_method_parameter(&def.ty),
                        };
                        parameters = self.parameter(next, def, id)?;
                    }
                    parameters.build_for_context(context)
                }
            },
        };

        let mut bundled = contextual.in_bundle(def.bundle.as_deref().unwrap_or(self.default_bundle));
        for hook in &def.hooks {
            bundled = bundled.with_hook(hook_spec(id, hook)?);
        }
        let dependents = self.rules(&def.dependent_rules, id)?;
        bundled.with_dependent_rules(dependents)
    }

    /// Applies the options of one parameter definition to the parameter the
    /// builder currently has open.
    fn parameter(
        &mut self,
        mut builder: RuleBuilder<Parameters>,
        def: &ParameterDef,
        rule: &str,
    ) -> Result<RuleBuilder<Parameters>, RuleError> {
        if def.exact {
            builder = builder.with_exact_type();
        }
        if let Some(detect) = &def.detect {
            builder = builder.should_be_detected_as_shared(factory(rule, detect)?);
        }
        if let Some(target) = def.reparent_to {
            builder = builder.as_child_of_parameter_with_id(target);
        }
        if let Some(ctx) = &def.context {
            builder = builder.in_parameter_context(context(rule, ctx)?);
        }
        if !def.rules.is_empty() {
            builder = builder.with_parameter_rules(self.rules(&def.rules, rule)?);
        }
        Ok(builder)
    }
}

fn open_parameters(member: RuleBuilder<Member>, first: &ParameterDef) -> RuleBuilder<Parameters> {
    match &first.keyword {
        Some(keyword) => member.with_keyword_parameter(keyword, &first.ty),
        None => member.with_method_parameter(&first.ty),
    }
}

fn context(rule: &str, def: &ContextDef) -> Result<DetectionContext, RuleError> {
    DetectionContext::from_parts(&def.family, def.kind.as_deref(), def.properties.clone()).ok_or_else(
        || {
            let shown = match &def.kind {
                Some(kind) => format!("{}/{}", def.family, kind),
                None => def.family.clone(),
            };
            RuleError::invalid_value(rule, "context", shown)
        },
    )
}

fn required<'d>(rule: &str, field: &str, value: &'d Option<String>) -> Result<&'d str, RuleError> {
    value
        .as_deref()
        .ok_or_else(|| RuleError::invalid_definition(rule, format!("factory needs `{field}`")))
}

fn parse_label<T>(
    rule: &str,
    field: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RuleError> {
    parse(value).ok_or_else(|| RuleError::invalid_value(rule, field, value))
}

fn named<F>(def: &FactoryDef, new: impl Fn() -> F, fixed: impl Fn(String) -> F) -> F {
    match &def.value {
        Some(value) => fixed(value.clone()),
        None => new(),
    }
}

/// Builds the value factory a definition names.
pub(super) fn factory(rule: &str, def: &FactoryDef) -> Result<Arc<dyn ValueFactory>, RuleError> {
    let factory: Arc<dyn ValueFactory> = match def.factory.as_str() {
        "algorithm" => Arc::new(named(def, AlgorithmFactory::new, AlgorithmFactory::fixed)),
        "mode" => Arc::new(named(def, ModeFactory::new, ModeFactory::fixed)),
        "padding" => Arc::new(named(def, PaddingFactory::new, PaddingFactory::fixed)),
        "curve" => Arc::new(named(def, CurveFactory::new, CurveFactory::fixed)),
        "size" => {
            let kind = required(rule, "kind", &def.kind)?;
            let unit = required(rule, "unit", &def.unit)?;
            Arc::new(SizeFactory::new(
                parse_label(rule, "size kind", kind, SizeKind::parse)?,
                parse_label(rule, "unit", unit, SizeUnit::parse)?,
            ))
        }
        "operation_mode" => Arc::new(OperationModeFactory),
        "cipher_action" => {
            let action = required(rule, "action", &def.action)?;
            Arc::new(CipherActionFactory(parse_label(
                rule,
                "cipher action",
                action,
                CipherAction::parse,
            )?))
        }
        "key_action" => {
            let action = required(rule, "action", &def.action)?;
            Arc::new(KeyActionFactory(parse_label(
                rule,
                "key action",
                action,
                KeyAction::parse,
            )?))
        }
        "signature_action" => {
            let action = required(rule, "action", &def.action)?;
            Arc::new(SignatureActionFactory(parse_label(
                rule,
                "signature action",
                action,
                SignatureAction::parse,
            )?))
        }
        "algorithm_parameter" => {
            let kind = def.kind.as_deref().unwrap_or("ANY");
            Arc::new(AlgorithmParameterFactory(parse_label(
                rule,
                "parameter kind",
                kind,
                ParameterKind::parse,
            )?))
        }
        other => return Err(RuleError::unknown_factory(rule, other)),
    };
    Ok(factory)
}

fn hook_spec(rule: &str, def: &HookDef) -> Result<HookSpec, RuleError> {
    let trigger = match &def.trigger {
        TriggerDef::Invocation { method } => HookTrigger::invocation(method),
        TriggerDef::EnumConstant { class, identifier } => {
            HookTrigger::EnumConstant(EnumConstant::new(class.as_deref(), identifier))
        }
    };
    let slot = Slot::from_id(def.slot)
        .ok_or_else(|| RuleError::invalid_value(rule, "slot", def.slot.to_string()))?;

    let spec = HookSpec::new(trigger, factory(rule, &def.detect)?).at_slot(slot);
    Ok(if def.root { spec } else { spec.lazy() })
}
