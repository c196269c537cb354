//! Append-only scenario catalog.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DomainError;

use super::scenario::Scenario;

/// The domain's scenario set: an immutable, append-only sequence plus an id index.
///
/// Scenarios are shared as `Arc<Scenario>` so trajectories and round records
/// can reference them without copying.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: Vec<Arc<Scenario>>,
    index: HashMap<String, usize>,
}

impl ScenarioCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog, failing on the first duplicate id.
    pub fn from_scenarios(
        scenarios: impl IntoIterator<Item = Scenario>,
    ) -> Result<Self, DomainError> {
        let mut catalog = Self::new();
        for scenario in scenarios {
            catalog.append(scenario)?;
        }
        Ok(catalog)
    }

    /// Appends a scenario. Ids are never reused.
    pub fn append(&mut self, scenario: Scenario) -> Result<Arc<Scenario>, DomainError> {
        if self.index.contains_key(&scenario.id) {
            return Err(DomainError::DuplicateScenario(scenario.id));
        }
        let scenario = Arc::new(scenario);
        self.index
            .insert(scenario.id.clone(), self.scenarios.len());
        self.scenarios.push(Arc::clone(&scenario));
        Ok(scenario)
    }

    /// Looks up a scenario by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Scenario>> {
        self.index.get(id).map(|&i| &self.scenarios[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All scenarios in insertion order.
    pub fn all(&self) -> &[Arc<Scenario>] {
        &self.scenarios
    }

    /// All scenario ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
