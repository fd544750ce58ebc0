//! Resource registry: declared resources keyed by id.
//!
//! Storage and lookup only. Dependencies may name resources declared later;
//! [`ResourceRegistry::validate`] resolves them once the declaration set is
//! complete, before any graph is built.

use std::collections::HashMap;
use tracing::debug;

use crate::adapters::ResourceConfig;
use crate::error::{DevhostError, Result};

use super::types::{ResourceId, ResourceKind, ResourceSpec};

/// Declared resources in declaration order.
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    specs: Vec<ResourceSpec>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect declarations, failing on the first duplicate id.
    pub fn from_specs(specs: impl IntoIterator<Item = ResourceSpec>) -> Result<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register_resource(spec)?;
        }
        Ok(registry)
    }

    /// Register a fully built declaration.
    pub fn register_resource(&mut self, spec: ResourceSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(DevhostError::DuplicateId(spec.id));
        }
        debug!(resource = %spec.id, kind = %spec.kind, "Registered resource");
        self.index.insert(spec.id.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Register a resource from its parts.
    pub fn register<I, S>(
        &mut self,
        id: impl Into<ResourceId>,
        kind: ResourceKind,
        config: ResourceConfig,
        depends_on: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<ResourceId>,
    {
        self.register_resource(
            ResourceSpec::new(id, kind)
                .with_config(config)
                .depends_on(depends_on),
        )
    }

    /// Check that every dependency names a declared resource.
    pub fn validate(&self) -> Result<()> {
        for spec in &self.specs {
            for dep in &spec.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(DevhostError::UnknownDependency {
                        resource: spec.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.index.get(id).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.specs.iter().map(|s| &s.id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
