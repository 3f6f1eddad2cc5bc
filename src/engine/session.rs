use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, enabled, trace, Level};

use super::store::{DetectionStore, StoreId};
use super::{DetectionEngine, RecursionPath, DEFAULT_MAX_DEPTH};
use crate::hooks::{HookDetectionObserver, HookInvocation, HookRepository};
use crate::language::LanguageSupport;
use crate::model::DetectedValue;
use crate::output::tree::render_store;
use crate::rules::{DetectionRule, Slot};

/// What a fired hook contributes to its origin store.
#[derive(Debug, Clone)]
pub struct HookDetection<N> {
    origin: StoreId,
    values: Vec<(Slot, DetectedValue<N>)>,
    stores: Vec<(Slot, DetectionStore<N>)>,
}

impl<N: Clone + PartialEq> HookDetection<N> {
    pub fn new(origin: StoreId) -> Self {
        Self {
            origin,
            values: Vec::new(),
            stores: Vec::new(),
        }
    }

    pub fn origin(&self) -> StoreId {
        self.origin
    }

    pub fn push_value(&mut self, slot: Slot, value: DetectedValue<N>) {
        self.values.push((slot, value));
    }

    pub fn push_child(&mut self, slot: Slot, store: DetectionStore<N>) {
        self.stores.push((slot, store));
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.stores.is_empty()
    }

    fn attach_to(self, store: &mut DetectionStore<N>) {
        for (slot, value) in self.values {
            store.push_value(slot, value);
        }
        for (slot, child) in self.stores {
            store.add_child(slot, child);
        }
    }
}

/// Collects hook firings; the session processes them outside the fan-out.
struct HookInbox<N> {
    received: Mutex<Vec<HookInvocation<N>>>,
}

impl<N: Clone + Send + Sync> HookDetectionObserver<N> for HookInbox<N> {
    fn on_hook_invoked(&self, invocation: &HookInvocation<N>) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
    }
}

impl<N> HookInbox<N> {
    fn take(&self) -> Vec<HookInvocation<N>> {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// One detection run over one program.
///
/// The host calls `visit` for every call or construction site it walks, in
/// any order and from any number of threads, then `finish` to collect the
/// store trees. Hooks live exactly as long as the session.
pub struct DetectionSession<'a, L: LanguageSupport> {
    lang: &'a L,
    rules: Vec<Arc<DetectionRule>>,
    hooks: Arc<HookRepository<L::Node>>,
    inbox: Arc<HookInbox<L::Node>>,
    observer: Arc<dyn HookDetectionObserver<L::Node>>,
    stores: Mutex<Vec<DetectionStore<L::Node>>>,
    hook_detections: Mutex<Vec<HookDetection<L::Node>>>,
    next_store: AtomicU64,
    max_depth: usize,
}

impl<'a, L: LanguageSupport> DetectionSession<'a, L> {
    pub fn new(lang: &'a L, rules: Vec<Arc<DetectionRule>>) -> Self {
        Self::with_hooks(lang, rules, Arc::new(HookRepository::new()))
    }

    /// Uses a caller-supplied repository, so listeners can be attached first.
    pub fn with_hooks(
        lang: &'a L,
        rules: Vec<Arc<DetectionRule>>,
        hooks: Arc<HookRepository<L::Node>>,
    ) -> Self {
        let inbox = Arc::new(HookInbox {
            received: Mutex::new(Vec::new()),
        });
        let observer: Arc<dyn HookDetectionObserver<L::Node>> = inbox.clone();
        Self {
            lang,
            rules,
            hooks,
            inbox,
            observer,
            stores: Mutex::new(Vec::new()),
            hook_detections: Mutex::new(Vec::new()),
            next_store: AtomicU64::new(1),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn hooks(&self) -> &Arc<HookRepository<L::Node>> {
        &self.hooks
    }

    pub fn rules(&self) -> &[Arc<DetectionRule>] {
        &self.rules
    }

    fn engine(&self) -> DetectionEngine<'_, L> {
        DetectionEngine::new(
            self.lang,
            &self.hooks,
            &self.observer,
            &self.next_store,
            self.max_depth,
        )
    }

    /// Records `site` for the hooks, then tries every rule on it. Returns the
    /// number of top-level stores created.
    pub fn visit(&self, site: &L::Node) -> usize {
        self.hooks.update(self.lang, site);
        self.drain_hooks();

        let engine = self.engine();
        let mut created = Vec::new();
        for rule in &self.rules {
            let mut path = RecursionPath::new();
            if let Some(store) = engine.apply_rule(rule, site, 0, &mut path) {
                if enabled!(Level::DEBUG) {
                    debug!("detection\n{}", render_store(self.lang, &store));
                }
                created.push(store);
            }
        }

        self.drain_hooks();

        let count = created.len();
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(created);
        count
    }

    /// Processes pending hook firings until none are left; a hook action may
    /// subscribe further hooks that fire straight away.
    fn drain_hooks(&self) {
        let engine = self.engine();
        loop {
            let batch = self.inbox.take();
            if batch.is_empty() {
                break;
            }
            let detections: Vec<_> = batch
                .iter()
                .filter_map(|invocation| engine.run_hook(invocation))
                .collect();
            self.hook_detections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(detections);
        }
    }

    /// Attaches hook results to their origin stores and hands over the trees
    /// in visit order.
    pub fn finish(self) -> Vec<DetectionStore<L::Node>> {
        self.drain_hooks();

        let mut stores = self
            .stores
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let detections = self
            .hook_detections
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        for detection in detections {
            let origin = detection.origin();
            match stores.iter_mut().find_map(|store| store.find_mut(origin)) {
                Some(store) => detection.attach_to(store),
                None => trace!(%origin, "hook origin store not found"),
            }
        }

        debug!(
            stores = stores.len(),
            hooks = self.hooks.len(),
            "detection session finished"
        );
        stores
    }
}
