//! Definition Catalog - registry of declared capabilities.
//!
//! Definitions are kept in registration order so "first found" is deterministic.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::domain::definition::DependencyDefinition;
use crate::domain::types::{ComponentType, DataType, DefinitionId, Role};

/// Combined filter for [`DefinitionCatalog::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DefinitionQuery {
    pub owner: Option<ComponentType>,
    pub role: Option<Role>,
    pub data_type: Option<DataType>,
}

impl DefinitionQuery {
    pub fn owner(mut self, owner: impl Into<ComponentType>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn data_type(mut self, data_type: impl Into<DataType>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    fn matches<P>(&self, def: &DependencyDefinition<P>) -> bool {
        if let Some(owner) = &self.owner
            && !def.owned_by(owner)
        {
            return false;
        }
        if let Some(role) = self.role {
            let ok = match role {
                Role::Provider => def.role.provides(),
                Role::Consumer => def.role.consumes(),
                Role::Both => def.role == Role::Both,
            };
            if !ok {
                return false;
            }
        }
        self.data_type
            .as_ref()
            .is_none_or(|data_type| &def.data_type == data_type)
    }
}

/// Provider and consumer definitions sharing one data type
#[derive(Debug)]
pub struct Compatible<'a, P> {
    pub providers: Vec<&'a DependencyDefinition<P>>,
    pub consumers: Vec<&'a DependencyDefinition<P>>,
}

impl<P> Compatible<'_, P> {
    pub fn is_connectable(&self) -> bool {
        !self.providers.is_empty() && !self.consumers.is_empty()
    }
}

pub struct DefinitionCatalog<P> {
    definitions: Vec<DependencyDefinition<P>>,
    by_id: HashMap<DefinitionId, usize>,
}

impl<P> Default for DefinitionCatalog<P> {
    fn default() -> Self {
        Self {
            definitions: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<P> DefinitionCatalog<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a definition. Re-registering an id overwrites it in place and logs a warning.
    pub fn register(&mut self, definition: DependencyDefinition<P>) {
        if let Some(&pos) = self.by_id.get(&definition.id) {
            warn!(id = %definition.id, "definition re-registered, overwriting");
            self.definitions[pos] = definition;
            return;
        }
        debug!(
            id = %definition.id,
            owner = %definition.owner,
            data_type = %definition.data_type,
            role = ?definition.role,
            "definition registered"
        );
        self.by_id
            .insert(definition.id.clone(), self.definitions.len());
        self.definitions.push(definition);
    }

    pub fn remove(&mut self, id: &DefinitionId) -> Option<DependencyDefinition<P>> {
        let pos = self.by_id.remove(id)?;
        let removed = self.definitions.remove(pos);
        for idx in self.by_id.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: &DefinitionId) -> Option<&DependencyDefinition<P>> {
        self.by_id.get(id).map(|&pos| &self.definitions[pos])
    }

    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &DependencyDefinition<P>> {
        self.definitions.iter()
    }

    pub fn query(&self, query: &DefinitionQuery) -> Vec<&DependencyDefinition<P>> {
        self.definitions.iter().filter(|d| query.matches(d)).collect()
    }

    pub fn by_owner(&self, owner: &ComponentType) -> Vec<&DependencyDefinition<P>> {
        self.query(&DefinitionQuery::default().owner(owner.clone()))
    }

    pub fn by_role(&self, role: Role) -> Vec<&DependencyDefinition<P>> {
        self.query(&DefinitionQuery::default().role(role))
    }

    pub fn by_data_type(&self, data_type: &DataType) -> Vec<&DependencyDefinition<P>> {
        self.query(&DefinitionQuery::default().data_type(data_type.clone()))
    }

    pub fn providers_for(&self, data_type: &DataType) -> Vec<&DependencyDefinition<P>> {
        self.query(
            &DefinitionQuery::default()
                .data_type(data_type.clone())
                .role(Role::Provider),
        )
    }

    pub fn consumers_for(&self, data_type: &DataType) -> Vec<&DependencyDefinition<P>> {
        self.query(
            &DefinitionQuery::default()
                .data_type(data_type.clone())
                .role(Role::Consumer),
        )
    }

    pub fn find_compatible(&self, data_type: &DataType) -> Compatible<'_, P> {
        Compatible {
            providers: self.providers_for(data_type),
            consumers: self.consumers_for(data_type),
        }
    }

    /// Distinct data types in registration order.
    pub fn data_types(&self) -> Vec<DataType> {
        let mut seen = Vec::new();
        for def in &self.definitions {
            if !seen.contains(&def.data_type) {
                seen.push(def.data_type.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
