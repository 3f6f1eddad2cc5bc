//! Rule matching and store assembly.
//!
//! `DetectionEngine` applies one rule to one site and builds the resulting
//! store tree: match-level value, parameter values, nested rule matches,
//! re-parenting, rule hooks and dependent rules. It is a short-lived view
//! over a session's state; `DetectionSession` owns that state and is what
//! callers drive.

mod session;
mod store;

pub use session::{DetectionSession, HookDetection};
pub use store::{DetectionStore, SlotValue, StoreId};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::hooks::{
    Hook, HookAction, HookDetectionObserver, HookInvocation, HookOrigin, HookRepository,
    HookTrigger,
};
use crate::language::{LanguageSupport, Resolution};
use crate::model::{DetectedValue, Literal};
use crate::rules::{DetectableParameter, DetectionRule, RuleId, Slot};

pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Rules and sites on the current recursion path.
pub type RecursionPath<N> = Vec<(RuleId, N)>;

pub(crate) struct DetectionEngine<'s, L: LanguageSupport> {
    lang: &'s L,
    hooks: &'s HookRepository<L::Node>,
    observer: &'s Arc<dyn HookDetectionObserver<L::Node>>,
    ids: &'s AtomicU64,
    max_depth: usize,
}

#[derive(Debug)]
struct ParameterOutcome<N> {
    values: Vec<DetectedValue<N>>,
    children: Vec<DetectionStore<N>>,
}

impl<N> Default for ParameterOutcome<N> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<'s, L: LanguageSupport> DetectionEngine<'s, L> {
    pub(crate) fn new(
        lang: &'s L,
        hooks: &'s HookRepository<L::Node>,
        observer: &'s Arc<dyn HookDetectionObserver<L::Node>>,
        ids: &'s AtomicU64,
        max_depth: usize,
    ) -> Self {
        Self {
            lang,
            hooks,
            observer,
            ids,
            max_depth,
        }
    }

    fn next_id(&self) -> StoreId {
        StoreId::new(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    /// Applies `rule` to `site`. `None` when the rule does not match, the
    /// depth cap is reached, or the same rule is already being applied to
    /// the same site further up the path.
    pub(crate) fn apply_rule(
        &self,
        rule: &Arc<DetectionRule>,
        site: &L::Node,
        level: usize,
        path: &mut RecursionPath<L::Node>,
    ) -> Option<DetectionStore<L::Node>> {
        if level >= self.max_depth {
            trace!(rule = %rule.label(), level, "max depth reached");
            return None;
        }
        if path.iter().any(|(id, s)| *id == rule.id() && s == site) {
            trace!(rule = %rule.label(), site = %self.lang.describe(site), "rule already on path");
            return None;
        }

        let arguments = rule.bind(self.lang, site)?;

        path.push((rule.id(), site.clone()));
        let store = self.build_store(rule, site, level, &arguments, path);
        path.pop();

        Some(store)
    }

    fn build_store(
        &self,
        rule: &Arc<DetectionRule>,
        site: &L::Node,
        level: usize,
        arguments: &[L::Node],
        path: &mut RecursionPath<L::Node>,
    ) -> DetectionStore<L::Node> {
        let mut store = DetectionStore::new(self.next_id(), level, Arc::clone(rule), site.clone());
        let origin = HookOrigin {
            store: store.id(),
            level,
            site: site.clone(),
        };

        if let Some(factory) = rule.match_factory() {
            let member = self.lang.method_name(site).unwrap_or_default();
            if let Some(kind) = factory.apply(&Literal::Str(member)) {
                store.push_value(Slot::Method, DetectedValue::new(kind, site.clone()));
            }
        }

        for (index, argument) in arguments.iter().enumerate() {
            let Some(detectable) = rule.parameter(index).and_then(|spec| spec.detectable.as_ref())
            else {
                continue;
            };
            let outcome = self.detect_parameter(&origin, rule, index, detectable, argument, path);
            let slot = Slot::Parameter(index);
            for value in outcome.values {
                store.push_value(slot, value);
            }
            for child in outcome.children {
                store.add_child(slot, child);
            }
        }

        store.reparent(|| self.next_id());

        for (index, spec) in rule.hooks().iter().enumerate() {
            let hook = Hook::new(
                spec.trigger.clone(),
                HookAction::Emit {
                    rule: Arc::clone(rule),
                    hook: index,
                },
                origin.clone(),
                spec.root,
            );
            self.hooks.subscribe(self.lang, hook, Arc::clone(self.observer));
        }

        if !rule.dependent_rules().is_empty() {
            for usage in self.lang.result_usages(site) {
                for dependent in rule.dependent_rules() {
                    if let Some(child) = self.apply_rule(dependent, &usage, level + 1, path) {
                        store.add_dependent(child);
                    }
                }
            }
        }

        trace!(
            rule = %rule.label(),
            store = %store.id(),
            level,
            values = store.values().len(),
            "rule matched"
        );
        store
    }

    /// Resolves the argument bound to parameter `index` and runs the
    /// parameter's factory and nested rules against every candidate.
    ///
    /// A candidate that is a parameter of the enclosing function cannot be
    /// known here; a root hook on invocations of that function picks the
    /// value up at its call sites on behalf of `origin`.
    fn detect_parameter(
        &self,
        origin: &HookOrigin<L::Node>,
        rule: &Arc<DetectionRule>,
        index: usize,
        detectable: &DetectableParameter,
        argument: &L::Node,
        path: &mut RecursionPath<L::Node>,
    ) -> ParameterOutcome<L::Node> {
        let mut outcome = ParameterOutcome::default();
        let mut targets = vec![argument.clone()];

        for candidate in self.lang.resolve(argument) {
            match &candidate.value {
                Resolution::Literal(literal) => {
                    if let Some(factory) = &detectable.factory {
                        match factory.apply(literal) {
                            Some(kind) => {
                                let value = DetectedValue::new(kind, candidate.tree.clone());
                                if !outcome.values.contains(&value) {
                                    outcome.values.push(value);
                                }
                            }
                            None => trace!(
                                rule = %rule.label(),
                                parameter = index,
                                factory = factory.name(),
                                literal = %literal,
                                "factory produced no value"
                            ),
                        }
                    }
                }
                Resolution::Unresolved => {
                    trace!(
                        rule = %rule.label(),
                        parameter = index,
                        argument = %self.lang.describe(argument),
                        "argument unresolved"
                    );
                }
                Resolution::FunctionParameter {
                    function,
                    index: position,
                    name,
                } => {
                    let hook = Hook::new(
                        HookTrigger::Call(function.clone()),
                        HookAction::ResolveArgument {
                            argument: *position,
                            keyword: name.clone(),
                            rule: Arc::clone(rule),
                            parameter: index,
                        },
                        origin.clone(),
                        true,
                    );
                    self.hooks.subscribe(self.lang, hook, Arc::clone(self.observer));
                }
            }

            if !targets.contains(&candidate.tree) {
                targets.push(candidate.tree);
            }
        }

        for nested in &detectable.rules {
            for target in &targets {
                if let Some(child) = self.apply_rule(nested, target, origin.level + 1, path) {
                    outcome.children.push(child);
                }
            }
        }

        outcome
    }

    /// Runs the action of a fired hook. The result is attached to the
    /// hook's origin store when the session finishes.
    pub(crate) fn run_hook(&self, invocation: &HookInvocation<L::Node>) -> Option<HookDetection<L::Node>> {
        let hook = &invocation.hook;
        let origin = hook.origin();
        let mut detection = HookDetection::new(origin.store);

        match hook.action() {
            HookAction::Emit { rule, hook: index } => {
                let spec = rule.hooks().get(*index)?;
                let literal = self.trigger_literal(hook.trigger(), &invocation.trigger_node)?;
                let kind = spec.factory.apply(&literal)?;
                detection.push_value(
                    spec.slot,
                    DetectedValue::new(kind, invocation.trigger_node.clone()),
                );
            }
            HookAction::ResolveArgument {
                argument,
                keyword,
                rule,
                parameter,
            } => {
                let detectable = rule.parameter(*parameter)?.detectable.as_ref()?;
                let arguments = self.lang.arguments(&invocation.trigger_node);
                let by_keyword = keyword.as_deref().and_then(|keyword| {
                    arguments
                        .iter()
                        .find(|arg| arg.keyword.as_deref() == Some(keyword))
                });
                let argument_node = by_keyword
                    .or_else(|| {
                        arguments
                            .iter()
                            .filter(|arg| arg.keyword.is_none())
                            .nth(*argument)
                    })?
                    .value
                    .clone();

                let mut path = RecursionPath::new();
                let outcome =
                    self.detect_parameter(origin, rule, *parameter, detectable, &argument_node, &mut path);
                let slot = Slot::Parameter(*parameter);

                match detectable.reparent_to {
                    Some(target) if !outcome.values.is_empty() => {
                        let context = detectable
                            .context
                            .clone()
                            .unwrap_or_else(|| rule.context().clone());
                        let mut synthetic = DetectionStore::with_context(
                            self.next_id(),
                            origin.level + 1,
                            Arc::clone(rule),
                            context,
                            origin.site.clone(),
                        );
                        for value in outcome.values {
                            synthetic.push_value(slot, value);
                        }
                        detection.push_child(target, synthetic);
                    }
                    _ => {
                        for value in outcome.values {
                            detection.push_value(slot, value);
                        }
                    }
                }
                for child in outcome.children {
                    detection.push_child(slot, child);
                }
            }
        }

        (!detection.is_empty()).then_some(detection)
    }

    fn trigger_literal(&self, trigger: &HookTrigger, node: &L::Node) -> Option<Literal> {
        match trigger {
            HookTrigger::Invocation { .. } | HookTrigger::Call(_) => {
                self.lang.method_name(node).map(Literal::Str)
            }
            HookTrigger::EnumConstant(_) => self
                .lang
                .enum_constant(node)
                .map(|constant| Literal::Str(constant.identifier)),
        }
    }
}
