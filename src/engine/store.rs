use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::model::{DetectedValue, DetectionContext};
use crate::rules::{DetectionRule, ParameterMatcher, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotValue<N> {
    pub slot: Slot,
    pub value: DetectedValue<N>,
}

/// Result tree node for one successful rule match.
///
/// Values are kept in production order (match level, then parameters
/// positionally). Children are grouped by the slot they hang under: nested
/// rule matches first, then re-parented synthetic stores, then anything a
/// hook added when the session finished.
#[derive(Debug, Clone)]
pub struct DetectionStore<N> {
    id: StoreId,
    level: usize,
    rule: Arc<DetectionRule>,
    context: DetectionContext,
    site: N,
    values: Vec<SlotValue<N>>,
    children: BTreeMap<Slot, Vec<DetectionStore<N>>>,
    dependents: Vec<DetectionStore<N>>,
}

impl<N: Clone + PartialEq> DetectionStore<N> {
    pub fn new(id: StoreId, level: usize, rule: Arc<DetectionRule>, site: N) -> Self {
        let context = rule.context().clone();
        Self::with_context(id, level, rule, context, site)
    }

    pub fn with_context(
        id: StoreId,
        level: usize,
        rule: Arc<DetectionRule>,
        context: DetectionContext,
        site: N,
    ) -> Self {
        Self {
            id,
            level,
            rule,
            context,
            site,
            values: Vec::new(),
            children: BTreeMap::new(),
            dependents: Vec::new(),
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn rule(&self) -> &Arc<DetectionRule> {
        &self.rule
    }

    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    pub fn site(&self) -> &N {
        &self.site
    }

    pub fn values(&self) -> &[SlotValue<N>] {
        &self.values
    }

    pub fn values_for(&self, slot: Slot) -> impl Iterator<Item = &DetectedValue<N>> {
        self.values
            .iter()
            .filter(move |v| v.slot == slot)
            .map(|v| &v.value)
    }

    pub fn children(&self) -> &BTreeMap<Slot, Vec<DetectionStore<N>>> {
        &self.children
    }

    pub fn children_for(&self, slot: Slot) -> &[DetectionStore<N>] {
        self.children.get(&slot).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dependents(&self) -> &[DetectionStore<N>] {
        &self.dependents
    }

    /// Returns `false` when the same value is already recorded for `slot`.
    pub fn push_value(&mut self, slot: Slot, value: DetectedValue<N>) -> bool {
        if self
            .values
            .iter()
            .any(|existing| existing.slot == slot && existing.value == value)
        {
            return false;
        }
        self.values.push(SlotValue { slot, value });
        true
    }

    pub fn add_child(&mut self, slot: Slot, child: DetectionStore<N>) {
        self.children.entry(slot).or_default().push(child);
    }

    pub fn add_dependent(&mut self, store: DetectionStore<N>) {
        self.dependents.push(store);
    }

    /// Moves values of parameters that declare a re-parenting target out of
    /// the top level, into one synthetic child store per parameter.
    pub fn reparent(&mut self, mut next_id: impl FnMut() -> StoreId) {
        let ParameterMatcher::List(specs) = self.rule.parameters() else {
            return;
        };

        let targets: Vec<(usize, Slot, DetectionContext)> = specs
            .iter()
            .enumerate()
            .filter_map(|(index, spec)| {
                let detectable = spec.detectable.as_ref()?;
                let target = detectable.reparent_to?;
                let context = detectable
                    .context
                    .clone()
                    .unwrap_or_else(|| self.context.clone());
                Some((index, target, context))
            })
            .collect();

        for (index, target, context) in targets {
            let slot = Slot::Parameter(index);
            let (moved, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut self.values)
                    .into_iter()
                    .partition(|v| v.slot == slot);
            self.values = kept;
            if moved.is_empty() {
                continue;
            }

            let mut synthetic = DetectionStore::with_context(
                next_id(),
                self.level + 1,
                Arc::clone(&self.rule),
                context,
                self.site.clone(),
            );
            synthetic.values = moved;
            self.add_child(target, synthetic);
        }
    }

    pub fn find_mut(&mut self, id: StoreId) -> Option<&mut DetectionStore<N>> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .values_mut()
            .flat_map(|children| children.iter_mut())
            .chain(self.dependents.iter_mut())
            .find_map(|child| child.find_mut(id))
    }

    /// Number of stores in this subtree, including this one.
    pub fn store_count(&self) -> usize {
        1 + self
            .children
            .values()
            .flatten()
            .chain(&self.dependents)
            .map(DetectionStore::store_count)
            .sum::<usize>()
    }

    /// Every value in this subtree, depth first.
    pub fn all_values(&self) -> Vec<&DetectedValue<N>> {
        let mut out: Vec<&DetectedValue<N>> = self.values.iter().map(|v| &v.value).collect();
        for child in self.children.values().flatten().chain(&self.dependents) {
            out.extend(child.all_values());
        }
        out
    }

    /// Identity for diagnostics only: rule, context and level.
    pub fn diagnostic_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.rule.id().hash(&mut hasher);
        self.context.hash(&mut hasher);
        self.level.hash(&mut hasher);
        hasher.finish()
    }
}
