//! Typestate rule builder.
//!
//! Each stage is its own type, so only valid call sequences compile:
//!
//! ```text
//! named/builder -> for_object[_exact]_types -> for_methods | for_constructor
//!   -> [should_be_detected_as]
//!   -> (with_method_parameter | with_keyword_parameter [per-parameter options])*
//!   -> without_parameters | with_any_parameters | build_for_context
//!   -> in_bundle -> with_hook* -> with_dependent_rules | without_dependent_rules
//! ```
//!
//! Parameter ids referenced through `as_child_of_parameter_with_id` are
//! checked when the rule is finished.

use std::sync::Arc;

use super::{
    Bundle, DetectableParameter, DetectionRule, MemberMatcher, ParameterMatcher, ParameterSpec,
    RuleId, Slot, TypeMatcher,
};
use crate::error::RuleError;
use crate::hooks::HookSpec;
use crate::model::{DetectionContext, ValueFactory};

pub struct RuleBuilder<S> {
    stage: S,
}

pub struct Start {
    name: Option<String>,
}

pub struct ObjectTypes {
    name: Option<String>,
    types: TypeMatcher,
}

pub struct Member {
    name: Option<String>,
    types: TypeMatcher,
    member: MemberMatcher,
    match_factory: Option<Arc<dyn ValueFactory>>,
}

pub struct Parameters {
    head: Member,
    declared: Vec<ParameterSpec>,
    current: ParameterSpec,
    error: Option<RuleError>,
}

pub struct Closed {
    head: Member,
    parameters: ParameterMatcher,
    error: Option<RuleError>,
}

pub struct Contextual {
    closed: Closed,
    context: DetectionContext,
}

pub struct Bundled {
    contextual: Contextual,
    bundle: Bundle,
    hooks: Vec<HookSpec>,
}

impl RuleBuilder<Start> {
    pub(super) fn new(name: Option<String>) -> Self {
        Self {
            stage: Start { name },
        }
    }

    /// Receiver types, matched including subtypes.
    pub fn for_object_types<I, S>(self, types: I) -> RuleBuilder<ObjectTypes>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_types(TypeMatcher::subtypes_of(types))
    }

    pub fn for_object_exact_types<I, S>(self, types: I) -> RuleBuilder<ObjectTypes>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_types(TypeMatcher::exactly(types))
    }

    fn with_types(self, types: TypeMatcher) -> RuleBuilder<ObjectTypes> {
        RuleBuilder {
            stage: ObjectTypes {
                name: self.stage.name,
                types,
            },
        }
    }
}

impl RuleBuilder<ObjectTypes> {
    pub fn for_methods<I, S>(self, methods: I) -> RuleBuilder<Member>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods = methods.into_iter().map(Into::into).collect();
        self.with_member(MemberMatcher::Methods(methods))
    }

    pub fn for_constructor(self) -> RuleBuilder<Member> {
        self.with_member(MemberMatcher::Constructor)
    }

    fn with_member(self, member: MemberMatcher) -> RuleBuilder<Member> {
        RuleBuilder {
            stage: Member {
                name: self.stage.name,
                types: self.stage.types,
                member,
                match_factory: None,
            },
        }
    }
}

impl RuleBuilder<Member> {
    /// Match-level value, produced from the member name unless the factory
    /// carries a fixed value.
    pub fn should_be_detected_as(mut self, factory: impl ValueFactory + 'static) -> Self {
        self.stage.match_factory = Some(Arc::new(factory));
        self
    }

    pub fn should_be_detected_as_shared(mut self, factory: Arc<dyn ValueFactory>) -> Self {
        self.stage.match_factory = Some(factory);
        self
    }

    pub fn with_method_parameter(self, ty: impl Into<String>) -> RuleBuilder<Parameters> {
        self.open_parameter(None, ty.into())
    }

    pub fn with_keyword_parameter(
        self,
        keyword: impl Into<String>,
        ty: impl Into<String>,
    ) -> RuleBuilder<Parameters> {
        self.open_parameter(Some(keyword.into()), ty.into())
    }

    fn open_parameter(self, keyword: Option<String>, ty: String) -> RuleBuilder<Parameters> {
        let mut current = ParameterSpec::new(TypeMatcher::subtypes_of([ty]));
        current.keyword = keyword;
        RuleBuilder {
            stage: Parameters {
                head: self.stage,
                declared: Vec::new(),
                current,
                error: None,
            },
        }
    }

    pub fn without_parameters(self) -> RuleBuilder<Closed> {
        self.close(ParameterMatcher::None)
    }

    pub fn with_any_parameters(self) -> RuleBuilder<Closed> {
        self.close(ParameterMatcher::Any)
    }

    fn close(self, parameters: ParameterMatcher) -> RuleBuilder<Closed> {
        RuleBuilder {
            stage: Closed {
                head: self.stage,
                parameters,
                error: None,
            },
        }
    }
}

impl RuleBuilder<Parameters> {
    pub fn with_method_parameter(self, ty: impl Into<String>) -> Self {
        self.next_parameter(None, ty.into())
    }

    pub fn with_keyword_parameter(self, keyword: impl Into<String>, ty: impl Into<String>) -> Self {
        self.next_parameter(Some(keyword.into()), ty.into())
    }

    fn next_parameter(mut self, keyword: Option<String>, ty: String) -> Self {
        let mut next = ParameterSpec::new(TypeMatcher::subtypes_of([ty]));
        next.keyword = keyword;
        let finished = std::mem::replace(&mut self.stage.current, next);
        self.stage.declared.push(finished);
        self
    }

    fn detectable(&mut self) -> &mut DetectableParameter {
        self.stage
            .current
            .detectable
            .get_or_insert_with(DetectableParameter::default)
    }

    /// Value produced from whatever the current parameter resolves to.
    pub fn should_be_detected_as(mut self, factory: impl ValueFactory + 'static) -> Self {
        self.detectable().factory = Some(Arc::new(factory));
        self
    }

    pub fn should_be_detected_as_shared(mut self, factory: Arc<dyn ValueFactory>) -> Self {
        self.detectable().factory = Some(factory);
        self
    }

    /// The current parameter's type must match without subtyping.
    pub fn with_exact_type(mut self) -> Self {
        self.stage.current.types.set_exact(true);
        self
    }

    /// Moves the current parameter's values into a child store under the
    /// value produced by parameter `id` (`-1` for the match level). The
    /// target must be declared earlier and produce a top-level value, so it
    /// cannot be re-parented itself.
    pub fn as_child_of_parameter_with_id(mut self, id: i32) -> Self {
        let index = self.stage.declared.len();
        let target = Slot::from_id(id).filter(|slot| match slot {
            Slot::Method => self.stage.head.match_factory.is_some(),
            Slot::Parameter(p) => self.stage.declared.get(*p).is_some_and(|spec| {
                spec.factory().is_some()
                    && spec
                        .detectable
                        .as_ref()
                        .is_some_and(|detectable| detectable.reparent_to.is_none())
            }),
        });

        match target {
            Some(slot) => self.detectable().reparent_to = Some(slot),
            None => {
                self.stage
                    .error
                    .get_or_insert(RuleError::unknown_parameter_id(id, index));
            }
        }
        self
    }

    pub fn in_parameter_context(mut self, context: DetectionContext) -> Self {
        self.detectable().context = Some(context);
        self
    }

    pub fn with_parameter_rules(mut self, rules: Vec<Arc<DetectionRule>>) -> Self {
        self.detectable().rules = rules;
        self
    }

    pub fn build_for_context(self, context: DetectionContext) -> RuleBuilder<Contextual> {
        let Parameters {
            head,
            mut declared,
            current,
            error,
        } = self.stage;
        declared.push(current);

        RuleBuilder {
            stage: Contextual {
                closed: Closed {
                    head,
                    parameters: ParameterMatcher::List(declared),
                    error,
                },
                context,
            },
        }
    }
}

impl RuleBuilder<Closed> {
    pub fn build_for_context(self, context: DetectionContext) -> RuleBuilder<Contextual> {
        RuleBuilder {
            stage: Contextual {
                closed: self.stage,
                context,
            },
        }
    }
}

impl RuleBuilder<Contextual> {
    pub fn in_bundle(self, bundle: impl Into<String>) -> RuleBuilder<Bundled> {
        RuleBuilder {
            stage: Bundled {
                contextual: self.stage,
                bundle: Bundle::new(bundle),
                hooks: Vec::new(),
            },
        }
    }
}

impl RuleBuilder<Bundled> {
    pub fn with_hook(mut self, hook: HookSpec) -> Self {
        self.stage.hooks.push(hook);
        self
    }

    pub fn with_dependent_rules(
        self,
        rules: Vec<Arc<DetectionRule>>,
    ) -> Result<Arc<DetectionRule>, RuleError> {
        self.finish(rules)
    }

    pub fn without_dependent_rules(self) -> Result<Arc<DetectionRule>, RuleError> {
        self.finish(Vec::new())
    }

    fn finish(self, dependent_rules: Vec<Arc<DetectionRule>>) -> Result<Arc<DetectionRule>, RuleError> {
        let Bundled {
            contextual,
            bundle,
            hooks,
        } = self.stage;
        let Contextual { closed, context } = contextual;
        let Closed {
            head,
            parameters,
            error,
        } = closed;

        if let Some(error) = error {
            return Err(error);
        }
        if let Some(hook) = hooks.iter().find(|hook| !slot_exists(&parameters, hook.slot)) {
            return Err(RuleError::unknown_parameter_id(
                hook.slot.id(),
                parameter_count(&parameters),
            ));
        }

        Ok(Arc::new(DetectionRule {
            id: RuleId::next(),
            name: head.name,
            object_types: head.types,
            member: head.member,
            match_factory: head.match_factory,
            parameters,
            context,
            bundle,
            hooks,
            dependent_rules,
        }))
    }
}

fn parameter_count(parameters: &ParameterMatcher) -> usize {
    match parameters {
        ParameterMatcher::List(specs) => specs.len(),
        _ => 0,
    }
}

fn slot_exists(parameters: &ParameterMatcher, slot: Slot) -> bool {
    match slot {
        Slot::Method => true,
        Slot::Parameter(i) => i < parameter_count(parameters),
    }
}
