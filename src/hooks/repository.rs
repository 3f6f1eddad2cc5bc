use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{debug, trace};

use super::observable::{HookDetectionObservable, HookDetectionObserver, HookInvocation};
use super::{Hook, HookId, HookKey};
use crate::language::LanguageSupport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryEvent {
    Added,
    Removed,
}

pub trait HookRepositoryListener<N>: Send + Sync {
    fn on_event(&self, event: RepositoryEvent, hook: &Hook<N>);
}

/// Session-scoped set of active hooks.
///
/// Every call site the session visits is recorded, so a root hook that is
/// subscribed late still sees sites visited before it. A hook notifies at
/// most once per site, however the site reaches it (back-fill or update).
pub struct HookRepository<N> {
    hooks: DashMap<HookKey, Arc<Hook<N>>>,
    listeners: Mutex<Vec<Arc<dyn HookRepositoryListener<N>>>>,
    observable: HookDetectionObservable<N>,
    visited: Mutex<Vec<N>>,
    fired: DashSet<(HookId, N)>,
}

impl<N> Default for HookRepository<N>
where
    N: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self {
            hooks: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
            observable: HookDetectionObservable::new(),
            visited: Mutex::new(Vec::new()),
            fired: DashSet::new(),
        }
    }
}

impl<N> HookRepository<N>
where
    N: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn HookRepositoryListener<N>>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn observable(&self) -> &HookDetectionObservable<N> {
        &self.observable
    }

    /// Activates `hook` and routes its notifications to `observer`.
    ///
    /// A hook whose key is already active is not added again; `false` is
    /// returned and the active hook keeps its identity. Root hooks are
    /// immediately tested against every site visited so far.
    pub fn subscribe<L>(&self, lang: &L, hook: Hook<N>, observer: Arc<dyn HookDetectionObserver<N>>) -> bool
    where
        L: LanguageSupport<Node = N>,
    {
        let hook = Arc::new(hook);
        self.observable.subscribe(hook.trigger(), observer);

        match self.hooks.entry(hook.key()) {
            Entry::Occupied(_) => {
                trace!(hook = hook.id().value(), trigger = %hook.trigger(), "hook already active");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&hook));
            }
        }

        debug!(
            hook = hook.id().value(),
            trigger = %hook.trigger(),
            root = hook.is_root_hook(),
            "hook subscribed"
        );
        self.emit(RepositoryEvent::Added, &hook);

        if hook.is_root_hook() {
            for site in self.visited_snapshot() {
                self.fire(lang, &hook, &site);
            }
        }
        true
    }

    /// Removing a hook that is not active is a no-op.
    pub fn unsubscribe(&self, hook: &Hook<N>) -> bool {
        let Some((_, removed)) = self.hooks.remove(&hook.key()) else {
            return false;
        };
        debug!(hook = removed.id().value(), trigger = %removed.trigger(), "hook unsubscribed");
        self.emit(RepositoryEvent::Removed, &removed);
        true
    }

    /// Records `site` as visited and tests it against every active hook.
    /// Returns the number of hooks that fired.
    pub fn update<L>(&self, lang: &L, site: &N) -> usize
    where
        L: LanguageSupport<Node = N>,
    {
        {
            let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
            if !visited.contains(site) {
                visited.push(site.clone());
            }
        }

        self.active_hooks()
            .iter()
            .filter(|hook| self.fire(lang, hook, site))
            .count()
    }

    /// Active hooks in subscription order.
    pub fn active_hooks(&self) -> Vec<Arc<Hook<N>>> {
        let mut hooks: Vec<Arc<Hook<N>>> =
            self.hooks.iter().map(|entry| Arc::clone(entry.value())).collect();
        hooks.sort_by_key(|hook| hook.id());
        hooks
    }

    pub fn contains(&self, hook: &Hook<N>) -> bool {
        self.hooks.contains_key(&hook.key())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn visited_snapshot(&self) -> Vec<N> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fire<L>(&self, lang: &L, hook: &Arc<Hook<N>>, site: &N) -> bool
    where
        L: LanguageSupport<Node = N>,
    {
        let Some(trigger_node) = lang.matches_trigger(hook.trigger(), site) else {
            return false;
        };
        if !self.fired.insert((hook.id(), site.clone())) {
            return false;
        }

        trace!(hook = hook.id().value(), site = %lang.describe(site), "hook fired");
        self.observable.notify(&HookInvocation {
            hook: Arc::clone(hook),
            site: site.clone(),
            trigger_node,
        });
        true
    }

    fn emit(&self, event: RepositoryEvent, hook: &Hook<N>) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_event(event, hook);
        }
    }
}
