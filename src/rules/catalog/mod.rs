//! Declarative rule catalogs.
//!
//! Rules are written as YAML or JSON (see [`schema`]) and compiled into
//! shared [`DetectionRule`] graphs. The crate ships a catalog for the
//! common Python cryptography libraries; users can add their own files.

mod compiler;
mod loader;
pub mod schema;

pub use loader::CatalogFormat;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CatalogError, RuleError};
use crate::rules::DetectionRule;

use compiler::{CompiledRule, Compiler};

const BUNDLED_PYTHON: &str = include_str!("../../../rules/python.yaml");
const BUNDLED_ORIGIN: &str = "<bundled>/python.yaml";

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    entry: bool,
    rule: Arc<DetectionRule>,
}

/// Compiled rules by id, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rules shipped with the crate.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::parse(BUNDLED_PYTHON, CatalogFormat::Yaml, Path::new(BUNDLED_ORIGIN))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = loader::read_catalog(path)?;
        Self::compile(&file, path)
    }

    pub fn parse(content: &str, format: CatalogFormat, origin: &Path) -> Result<Self, CatalogError> {
        let file = loader::parse_catalog(content, format, origin)?;
        Self::compile(&file, origin)
    }

    fn compile(file: &schema::CatalogFile, origin: &Path) -> Result<Self, CatalogError> {
        let compiled = Compiler::compile(file).map_err(|e| CatalogError::invalid_rules(origin, e))?;
        let mut catalog = Self::new();
        catalog
            .insert_all(compiled)
            .map_err(|e| CatalogError::invalid_rules(origin, e))?;
        debug!(
            path = %origin.display(),
            rules = catalog.len(),
            entry_rules = catalog.entry_count(),
            "compiled rule catalog"
        );
        Ok(catalog)
    }

    fn insert_all(&mut self, compiled: Vec<CompiledRule>) -> Result<(), RuleError> {
        for CompiledRule { id, entry, rule } in compiled {
            if self.by_id.contains_key(&id) {
                return Err(RuleError::duplicate_rule(id));
            }
            self.by_id.insert(id.clone(), self.entries.len());
            self.entries.push(Entry { id, entry, rule });
        }
        Ok(())
    }

    /// Adds another catalog's rules. Ids must stay unique across catalogs,
    /// since references are resolved per file.
    pub fn merge(&mut self, other: RuleCatalog) -> Result<(), RuleError> {
        if let Some(clash) = other.entries.iter().find(|e| self.by_id.contains_key(&e.id)) {
            return Err(RuleError::duplicate_rule(&clash.id));
        }
        let added = other.entries.len();
        let compiled = other
            .entries
            .into_iter()
            .map(|Entry { id, entry, rule }| CompiledRule { id, entry, rule })
            .collect();
        self.insert_all(compiled)?;
        info!(added, total = self.len(), "merged rule catalog");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<DetectionRule>> {
        self.by_id.get(id).map(|&index| &self.entries[index].rule)
    }

    /// Rules a session tries on every visited site.
    pub fn entry_rules(&self) -> Vec<Arc<DetectionRule>> {
        self.entries
            .iter()
            .filter(|e| e.entry)
            .map(|e| Arc::clone(&e.rule))
            .collect()
    }

    /// Entry rules whose bundle is one of `bundles`; all entry rules when
    /// `bundles` is empty.
    pub fn entry_rules_in(&self, bundles: &[String]) -> Vec<Arc<DetectionRule>> {
        if bundles.is_empty() {
            return self.entry_rules();
        }
        self.entries
            .iter()
            .filter(|e| e.entry && bundles.iter().any(|b| b == e.rule.bundle().as_str()))
            .map(|e| Arc::clone(&e.rule))
            .collect()
    }

    /// Distinct bundle names, sorted.
    pub fn bundles(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.rule.bundle().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.iter().filter(|e| e.entry).count()
    }
}
