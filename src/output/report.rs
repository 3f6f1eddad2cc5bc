use serde::Serialize;

use crate::engine::DetectionStore;
use crate::language::{LanguageSupport, SourceLocation};
use crate::model::DetectedValue;
use crate::rules::Slot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueReport {
    pub kind: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub slot: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Serializable, host-independent copy of a detection store tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub rule: String,
    pub bundle: String,
    pub level: usize,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    pub values: Vec<ValueReport>,
    /// Slot of the parent this store hangs under; absent for roots and dependents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_slot: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StoreReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<StoreReport>,
}

impl StoreReport {
    pub fn from_store<L: LanguageSupport>(lang: &L, store: &DetectionStore<L::Node>) -> Self {
        Self::build(lang, store, None)
    }

    fn build<L: LanguageSupport>(
        lang: &L,
        store: &DetectionStore<L::Node>,
        parent_slot: Option<Slot>,
    ) -> Self {
        let values = store
            .values()
            .iter()
            .map(|v| value_report(lang, v.slot, &v.value))
            .collect();

        let children = store
            .children()
            .iter()
            .flat_map(|(slot, children)| {
                children
                    .iter()
                    .map(move |child| Self::build(lang, child, Some(*slot)))
            })
            .collect();

        let dependents = store
            .dependents()
            .iter()
            .map(|dependent| Self::build(lang, dependent, None))
            .collect();

        StoreReport {
            rule: store.rule().label(),
            bundle: store.rule().bundle().to_string(),
            level: store.level(),
            context: store.context().to_string(),
            location: lang.source_location(store.site()),
            values,
            parent_slot: parent_slot.map(|slot| slot.id()),
            children,
            dependents,
        }
    }

    /// Values of this store and every store below it.
    pub fn all_values(&self) -> Vec<&ValueReport> {
        let mut out: Vec<&ValueReport> = self.values.iter().collect();
        for store in self.children.iter().chain(&self.dependents) {
            out.extend(store.all_values());
        }
        out
    }

    pub fn store_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .chain(&self.dependents)
            .map(StoreReport::store_count)
            .sum::<usize>()
    }
}

fn value_report<L: LanguageSupport>(lang: &L, slot: Slot, value: &DetectedValue<L::Node>) -> ValueReport {
    ValueReport {
        kind: value.kind().kind_name().to_string(),
        value: value.to_string(),
        unit: value.kind().unit().map(|unit| unit.to_string()),
        slot: slot.id(),
        location: lang.source_location(value.location()),
    }
}
