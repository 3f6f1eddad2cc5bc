//! Hooks: interest in a semantic trigger anywhere on the reachable call stack.
//!
//! A hook pairs a trigger (an invocation of some function, or an enum
//! constant passed to some call) with an action to run against the site
//! where the trigger shows up, on behalf of the detection store that
//! registered it. The repository tests active hooks against every visited
//! call site; the observable fans hits out to subscribers.

mod observable;
mod repository;

pub use observable::{HookDetectionObservable, HookDetectionObserver, HookInvocation};
pub use repository::{HookRepository, HookRepositoryListener, RepositoryEvent};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::StoreId;
use crate::language::FunctionRef;
use crate::model::ValueFactory;
use crate::rules::{DetectionRule, RuleId, Slot};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumConstant {
    pub class_name: Option<String>,
    pub identifier: String,
}

impl EnumConstant {
    pub fn new(class_name: Option<&str>, identifier: impl Into<String>) -> Self {
        Self {
            class_name: class_name.map(str::to_string),
            identifier: identifier.into(),
        }
    }

    /// Identifiers must be equal. Class names match when either side is
    /// unknown, when they are equal, or when one is the other's simple name.
    pub fn matches(&self, other: &EnumConstant) -> bool {
        if self.identifier != other.identifier {
            return false;
        }
        match (&self.class_name, &other.class_name) {
            (Some(a), Some(b)) => a == b || simple_name(a) == simple_name(b),
            _ => true,
        }
    }
}

fn simple_name(qualified: &str) -> &str {
    qualified.rsplit(['.', ':', '/', '$']).next().unwrap_or(qualified)
}

impl fmt::Display for EnumConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class_name {
            Some(class) => write!(f, "{class}.{}", self.identifier),
            None => f.write_str(&self.identifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookTrigger {
    /// Any call of a member with this name.
    Invocation { method: String },
    /// A call that targets this very function.
    Call(FunctionRef),
    EnumConstant(EnumConstant),
}

impl HookTrigger {
    pub fn invocation(method: impl Into<String>) -> Self {
        Self::Invocation {
            method: method.into(),
        }
    }
}

impl fmt::Display for HookTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTrigger::Invocation { method } => write!(f, "invocation of {method}"),
            HookTrigger::Call(function) => write!(f, "call of {function}"),
            HookTrigger::EnumConstant(constant) => write!(f, "enum constant {constant}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

impl HookId {
    fn next() -> Self {
        Self(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A hook declared on a rule: when the rule matches, the engine subscribes
/// it and, on trigger, applies `factory` to the trigger's literal.
#[derive(Debug, Clone)]
pub struct HookSpec {
    pub trigger: HookTrigger,
    pub factory: Arc<dyn ValueFactory>,
    pub slot: Slot,
    pub root: bool,
}

impl HookSpec {
    pub fn new(trigger: HookTrigger, factory: Arc<dyn ValueFactory>) -> Self {
        Self {
            trigger,
            factory,
            slot: Slot::Method,
            root: true,
        }
    }

    pub fn at_slot(mut self, slot: Slot) -> Self {
        self.slot = slot;
        self
    }

    /// Non-root hooks only react to sites visited after they were subscribed.
    pub fn lazy(mut self) -> Self {
        self.root = false;
        self
    }
}

#[derive(Debug, Clone)]
pub enum HookAction {
    /// Resolve the trigger site's argument (passed as `keyword`, else the
    /// `argument`-th positional one) and run parameter `parameter` of `rule`
    /// (factory and nested rules) against it.
    ResolveArgument {
        argument: usize,
        keyword: Option<String>,
        rule: Arc<DetectionRule>,
        parameter: usize,
    },
    /// Run `rule.hooks()[hook]` against the trigger literal.
    Emit {
        rule: Arc<DetectionRule>,
        hook: usize,
    },
}

impl HookAction {
    pub fn rule(&self) -> &Arc<DetectionRule> {
        match self {
            HookAction::ResolveArgument { rule, .. } | HookAction::Emit { rule, .. } => rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ActionKey {
    ResolveArgument {
        argument: usize,
        rule: RuleId,
        parameter: usize,
    },
    Emit {
        rule: RuleId,
        hook: usize,
    },
}

/// Identity of a hook: the same trigger, action and origin store are the
/// same interest, however many times it is subscribed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookKey {
    trigger: HookTrigger,
    action: ActionKey,
    origin: StoreId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOrigin<N> {
    pub store: StoreId,
    pub level: usize,
    pub site: N,
}

#[derive(Debug, Clone)]
pub struct Hook<N> {
    id: HookId,
    trigger: HookTrigger,
    action: HookAction,
    origin: HookOrigin<N>,
    root: bool,
}

impl<N> Hook<N> {
    pub fn new(trigger: HookTrigger, action: HookAction, origin: HookOrigin<N>, root: bool) -> Self {
        Self {
            id: HookId::next(),
            trigger,
            action,
            origin,
            root,
        }
    }

    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn trigger(&self) -> &HookTrigger {
        &self.trigger
    }

    pub fn action(&self) -> &HookAction {
        &self.action
    }

    pub fn origin(&self) -> &HookOrigin<N> {
        &self.origin
    }

    pub fn is_root_hook(&self) -> bool {
        self.root
    }

    pub fn key(&self) -> HookKey {
        let action = match &self.action {
            HookAction::ResolveArgument {
                argument,
                rule,
                parameter,
                ..
            } => ActionKey::ResolveArgument {
                argument: *argument,
                rule: rule.id(),
                parameter: *parameter,
            },
            HookAction::Emit { rule, hook } => ActionKey::Emit {
                rule: rule.id(),
                hook: *hook,
            },
        };
        HookKey {
            trigger: self.trigger.clone(),
            action,
            origin: self.origin.store,
        }
    }
}
