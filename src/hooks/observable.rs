use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::{Hook, HookTrigger};

/// One firing of a hook: `site` is the visited call site that satisfied the
/// trigger, `trigger_node` the node inside it that did (the call itself for
/// invocations, the argument for enum constants).
#[derive(Debug, Clone)]
pub struct HookInvocation<N> {
    pub hook: Arc<Hook<N>>,
    pub site: N,
    pub trigger_node: N,
}

pub trait HookDetectionObserver<N>: Send + Sync {
    fn on_hook_invoked(&self, invocation: &HookInvocation<N>);
}

type Subscribers<N> = Vec<Arc<dyn HookDetectionObserver<N>>>;

/// Per-trigger subscriber lists.
pub struct HookDetectionObservable<N> {
    subscribers: DashMap<HookTrigger, Subscribers<N>>,
}

impl<N> Default for HookDetectionObservable<N> {
    fn default() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }
}

impl<N> HookDetectionObservable<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `observer` was already subscribed to `trigger`.
    pub fn subscribe(&self, trigger: &HookTrigger, observer: Arc<dyn HookDetectionObserver<N>>) -> bool {
        let mut entry = self.subscribers.entry(trigger.clone()).or_default();
        if entry.iter().any(|existing| same_observer(existing, &observer)) {
            return false;
        }
        entry.push(observer);
        true
    }

    pub fn unsubscribe(&self, trigger: &HookTrigger, observer: &Arc<dyn HookDetectionObserver<N>>) -> bool {
        let Some(mut entry) = self.subscribers.get_mut(trigger) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|existing| !same_observer(existing, observer));
        before != entry.len()
    }

    pub fn subscriber_count(&self, trigger: &HookTrigger) -> usize {
        self.subscribers.get(trigger).map_or(0, |entry| entry.len())
    }

    /// Delivers `invocation` to everyone subscribed to its trigger. The list
    /// is copied first, so observers may subscribe or unsubscribe from inside
    /// the callback.
    pub fn notify(&self, invocation: &HookInvocation<N>) -> usize {
        let snapshot: Subscribers<N> = self
            .subscribers
            .get(invocation.hook.trigger())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        trace!(
            trigger = %invocation.hook.trigger(),
            hook = invocation.hook.id().value(),
            subscribers = snapshot.len(),
            "notifying hook subscribers"
        );

        for observer in &snapshot {
            observer.on_hook_invoked(invocation);
        }
        snapshot.len()
    }
}

fn same_observer<N>(
    a: &Arc<dyn HookDetectionObserver<N>>,
    b: &Arc<dyn HookDetectionObserver<N>>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
