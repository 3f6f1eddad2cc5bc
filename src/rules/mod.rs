//! Detection rules.
//!
//! A rule describes one matchable call or construction pattern: the receiver
//! types, the member, the parameter shape, what to record when it matches
//! and which rules to try next. Rules are immutable once built and shared
//! between sessions and threads as `Arc<DetectionRule>`.

mod builder;
pub mod catalog;
mod matcher;

pub use builder::{
    Bundled, Closed, Contextual, Member, ObjectTypes, Parameters, RuleBuilder, Start,
};
pub use matcher::{MemberMatcher, TypeMatcher, ANY_TYPE};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::hooks::HookSpec;
use crate::language::LanguageSupport;
use crate::model::{DetectionContext, ValueFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u64);

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

impl RuleId {
    fn next() -> Self {
        Self(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Provenance tag: which catalog or library a rule belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bundle(String);

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The producer of a value inside one store: the match itself or parameter `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Method,
    Parameter(usize),
}

impl Slot {
    /// `-1` is the match level; non-negative ids are parameter indexes.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            -1 => Some(Slot::Method),
            i if i >= 0 => usize::try_from(i).ok().map(Slot::Parameter),
            _ => None,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Slot::Method => -1,
            Slot::Parameter(i) => i32::try_from(*i).unwrap_or(i32::MAX),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id().fmt(f)
    }
}

/// What to do with the argument bound to a parameter.
#[derive(Debug, Clone, Default)]
pub struct DetectableParameter {
    pub factory: Option<Arc<dyn ValueFactory>>,
    /// Values produced here move into a synthetic child store under this slot.
    pub reparent_to: Option<Slot>,
    pub context: Option<DetectionContext>,
    /// Matched against the argument expression and every resolved candidate.
    pub rules: Vec<Arc<DetectionRule>>,
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub types: TypeMatcher,
    pub keyword: Option<String>,
    pub detectable: Option<DetectableParameter>,
}

impl ParameterSpec {
    pub fn new(types: TypeMatcher) -> Self {
        Self {
            types,
            keyword: None,
            detectable: None,
        }
    }

    pub fn factory(&self) -> Option<&Arc<dyn ValueFactory>> {
        self.detectable.as_ref()?.factory.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum ParameterMatcher {
    /// Any arity, arguments ignored.
    Any,
    /// Zero arguments.
    None,
    List(Vec<ParameterSpec>),
}

#[derive(Debug)]
pub struct DetectionRule {
    id: RuleId,
    name: Option<String>,
    object_types: TypeMatcher,
    member: MemberMatcher,
    match_factory: Option<Arc<dyn ValueFactory>>,
    parameters: ParameterMatcher,
    context: DetectionContext,
    bundle: Bundle,
    hooks: Vec<HookSpec>,
    dependent_rules: Vec<Arc<DetectionRule>>,
}

impl DetectionRule {
    pub fn builder() -> RuleBuilder<Start> {
        RuleBuilder::new(None)
    }

    pub fn named(name: impl Into<String>) -> RuleBuilder<Start> {
        RuleBuilder::new(Some(name.into()))
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for logs and errors.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("rule{}", self.id),
        }
    }

    pub fn object_types(&self) -> &TypeMatcher {
        &self.object_types
    }

    pub fn member(&self) -> &MemberMatcher {
        &self.member
    }

    pub fn match_factory(&self) -> Option<&Arc<dyn ValueFactory>> {
        self.match_factory.as_ref()
    }

    pub fn parameters(&self) -> &ParameterMatcher {
        &self.parameters
    }

    pub fn parameter(&self, index: usize) -> Option<&ParameterSpec> {
        match &self.parameters {
            ParameterMatcher::List(specs) => specs.get(index),
            _ => None,
        }
    }

    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn hooks(&self) -> &[HookSpec] {
        &self.hooks
    }

    pub fn dependent_rules(&self) -> &[Arc<DetectionRule>] {
        &self.dependent_rules
    }

    /// Tests `site` against this rule. On a match returns the argument bound
    /// to each declared parameter, in declaration order (empty for `Any` and
    /// `None`). A receiver of unknown type only matches wildcard rules.
    pub fn bind<L: LanguageSupport>(&self, lang: &L, site: &L::Node) -> Option<Vec<L::Node>> {
        let receiver = lang.invoked_object_type(site);
        if !self.object_types.matches(lang, receiver.as_deref()) {
            return None;
        }

        let method = lang.method_name(site);
        if !self
            .member
            .matches(method.as_deref(), lang.is_constructor(site))
        {
            return None;
        }

        match &self.parameters {
            ParameterMatcher::Any => Some(Vec::new()),
            ParameterMatcher::None => lang.arguments(site).is_empty().then(Vec::new),
            ParameterMatcher::List(specs) => bind_parameters(lang, site, specs),
        }
    }
}

fn bind_parameters<L: LanguageSupport>(
    lang: &L,
    site: &L::Node,
    specs: &[ParameterSpec],
) -> Option<Vec<L::Node>> {
    let arguments = lang.arguments(site);
    if arguments.len() != specs.len() {
        return None;
    }

    let mut taken = vec![false; arguments.len()];
    let mut bound: Vec<Option<usize>> = vec![None; specs.len()];

    for (index, spec) in specs.iter().enumerate() {
        let Some(keyword) = spec.keyword.as_deref() else {
            continue;
        };
        if let Some(position) = arguments
            .iter()
            .position(|argument| argument.keyword.as_deref() == Some(keyword))
        {
            bound[index] = Some(position);
            taken[position] = true;
        }
    }

    let mut free = (0..arguments.len()).filter(|&i| !taken[i]);
    for slot in bound.iter_mut().filter(|slot| slot.is_none()) {
        *slot = free.next();
    }

    specs
        .iter()
        .zip(bound)
        .map(|(spec, position)| {
            let argument = &arguments[position?];
            let actual = lang.argument_type(&argument.value);
            spec.types
                .matches(lang, actual.as_deref())
                .then(|| argument.value.clone())
        })
        .collect()
}
