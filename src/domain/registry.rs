//! Dependency Registry - live instance-level edges and their lookup indices.
//!
//! Four two-level indices are kept in sync with the edge table:
//! - data type -> provider -> edges
//! - data type -> consumer -> edges
//! - provider -> consumer -> edges
//! - consumer -> provider -> edges
//!
//! Every edge appears in exactly one bucket of each. Removing an edge prunes any
//! bucket it leaves empty, at both levels.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::domain::catalog::DefinitionCatalog;
use crate::domain::definition::DependencyDefinition;
use crate::domain::edge::{Dependency, DependencyOptions, EdgeDefaults, EdgeMetrics};
use crate::domain::error::{FlowError, FlowResult};
use crate::domain::graph::FlowGraph;
use crate::domain::types::{ComponentType, ConnectionStatus, DataType, DependencyId, InstanceId};

/// Outcome of [`DependencyRegistry::create_dependency`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: DependencyId,
    /// `false` when an existing edge for the same triple was returned instead
    pub created: bool,
}

#[derive(Debug)]
struct NestedIndex<K> {
    buckets: HashMap<K, HashMap<InstanceId, Vec<DependencyId>>>,
}

impl<K> Default for NestedIndex<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> NestedIndex<K> {
    fn insert(&mut self, outer: &K, inner: &InstanceId, id: DependencyId) {
        self.buckets
            .entry(outer.clone())
            .or_default()
            .entry(inner.clone())
            .or_default()
            .push(id);
    }

    fn remove(&mut self, outer: &K, inner: &InstanceId, id: DependencyId) {
        let Some(inner_map) = self.buckets.get_mut(outer) else {
            return;
        };
        if let Some(ids) = inner_map.get_mut(inner) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                inner_map.remove(inner);
            }
        }
        if inner_map.is_empty() {
            self.buckets.remove(outer);
        }
    }

    fn get(&self, outer: &K, inner: &InstanceId) -> &[DependencyId] {
        self.buckets
            .get(outer)
            .and_then(|m| m.get(inner))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn all(&self, outer: &K) -> Vec<DependencyId> {
        let mut ids: Vec<DependencyId> = self
            .buckets
            .get(outer)
            .map(|m| m.values().flatten().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn inner_keys(&self, outer: &K) -> Vec<InstanceId> {
        let mut keys: Vec<InstanceId> = self
            .buckets
            .get(outer)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn bucket_count(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }
}

fn hinted<P>(def: &DependencyDefinition<P>, hint: &Option<ComponentType>) -> bool {
    hint.as_ref().is_none_or(|t| def.owned_by(t))
}

pub struct DependencyRegistry<P> {
    catalog: DefinitionCatalog<P>,
    defaults: EdgeDefaults,
    dependencies: HashMap<DependencyId, Dependency>,
    providers_by_data_type: NestedIndex<DataType>,
    consumers_by_data_type: NestedIndex<DataType>,
    consumers_by_provider: NestedIndex<InstanceId>,
    providers_by_consumer: NestedIndex<InstanceId>,
    next_id: u64,
    /// Bumped whenever edges or definitions change
    revision: u64,
}

impl<P> Default for DependencyRegistry<P> {
    fn default() -> Self {
        Self::new(DefinitionCatalog::new())
    }
}

impl<P> DependencyRegistry<P> {
    pub fn new(catalog: DefinitionCatalog<P>) -> Self {
        Self::with_defaults(catalog, EdgeDefaults::default())
    }

    pub fn with_defaults(catalog: DefinitionCatalog<P>, defaults: EdgeDefaults) -> Self {
        Self {
            catalog,
            defaults,
            dependencies: HashMap::new(),
            providers_by_data_type: NestedIndex::default(),
            consumers_by_data_type: NestedIndex::default(),
            consumers_by_provider: NestedIndex::default(),
            providers_by_consumer: NestedIndex::default(),
            next_id: 1,
            revision: 0,
        }
    }

    pub fn catalog(&self) -> &DefinitionCatalog<P> {
        &self.catalog
    }

    pub fn defaults(&self) -> EdgeDefaults {
        self.defaults
    }

    pub fn register_definition(&mut self, definition: DependencyDefinition<P>) {
        self.catalog.register(definition);
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Create an edge between two live instances.
    ///
    /// The first registered provider and consumer definitions for `data_type` win,
    /// optionally narrowed by the component types in `options`. No priority
    /// resolution is applied.
    pub fn create_dependency(
        &mut self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
        options: DependencyOptions,
    ) -> FlowResult<Connection> {
        let Some((provider_def, consumer_def)) = self.resolve_definitions(data_type, &options)
        else {
            warn!(
                provider = %provider_id,
                consumer = %consumer_id,
                data_type = %data_type,
                "no matching definition, dependency not created"
            );
            return Err(FlowError::MissingDefinition(data_type.clone()));
        };

        let allow_multiple = provider_def.allow_multiple || consumer_def.allow_multiple;
        let one_to_many = provider_def.one_to_many;
        let many_to_one = consumer_def.many_to_one;
        let provider_definition_id = provider_def.id.clone();
        let consumer_definition_id = consumer_def.id.clone();
        let sync = match provider_def.sync.intersect(consumer_def.sync) {
            Some(sync) => sync,
            None => {
                warn!(
                    provider_definition = %provider_def.id,
                    consumer_definition = %consumer_def.id,
                    "sync strategies disagree, falling back to provider strategy"
                );
                provider_def.sync
            }
        };

        if !allow_multiple
            && let Some(existing) = self.find_dependency(provider_id, consumer_id, data_type)
        {
            debug!(id = %existing.id, "dependency already exists");
            return Ok(Connection {
                id: existing.id,
                created: false,
            });
        }

        if !one_to_many
            && self
                .consumers_for_provider(provider_id, data_type)
                .any(|c| c != consumer_id)
        {
            return Err(self.multiplicity_error(
                provider_id,
                consumer_id,
                data_type,
                "provider definition is not one-to-many",
            ));
        }
        if !many_to_one
            && self
                .providers_for_consumer(consumer_id, data_type)
                .any(|p| p != provider_id)
        {
            return Err(self.multiplicity_error(
                provider_id,
                consumer_id,
                data_type,
                "consumer definition is not many-to-one",
            ));
        }

        let status = if FlowGraph::from_dependencies(self.dependencies.values())
            .would_close_cycle(provider_id, consumer_id)
        {
            warn!(
                provider = %provider_id,
                consumer = %consumer_id,
                data_type = %data_type,
                "edge would close a cycle, marking CYCLE_DETECTED"
            );
            ConnectionStatus::CycleDetected
        } else {
            ConnectionStatus::Disconnected
        };

        let id = DependencyId(self.next_id);
        self.next_id += 1;

        let dependency = Dependency {
            id,
            provider_id: provider_id.clone(),
            consumer_id: consumer_id.clone(),
            provider_definition_id,
            consumer_definition_id,
            data_type: data_type.clone(),
            status,
            sync,
            last_updated: SystemTime::now(),
            active: options.active.unwrap_or(self.defaults.active),
            auto_update: options.auto_update.unwrap_or(self.defaults.auto_update),
            notify_on_change: options
                .notify_on_change
                .unwrap_or(self.defaults.notify_on_change),
            chain: options.chain,
            metrics: EdgeMetrics::default(),
        };

        self.providers_by_data_type.insert(data_type, provider_id, id);
        self.consumers_by_data_type.insert(data_type, consumer_id, id);
        self.consumers_by_provider.insert(provider_id, consumer_id, id);
        self.providers_by_consumer.insert(consumer_id, provider_id, id);
        self.dependencies.insert(id, dependency);
        self.revision += 1;

        info!(
            id = %id,
            provider = %provider_id,
            consumer = %consumer_id,
            data_type = %data_type,
            "dependency created"
        );
        Ok(Connection { id, created: true })
    }

    fn resolve_definitions(
        &self,
        data_type: &DataType,
        options: &DependencyOptions,
    ) -> Option<(&DependencyDefinition<P>, &DependencyDefinition<P>)> {
        let compatible = self.catalog.find_compatible(data_type);
        let provider = compatible
            .providers
            .into_iter()
            .find(|d| hinted(d, &options.provider_type))?;
        let consumer = compatible
            .consumers
            .into_iter()
            .find(|d| hinted(d, &options.consumer_type))?;
        Some((provider, consumer))
    }

    fn multiplicity_error(
        &self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
        reason: &'static str,
    ) -> FlowError {
        warn!(
            provider = %provider_id,
            consumer = %consumer_id,
            data_type = %data_type,
            reason,
            "dependency rejected"
        );
        FlowError::MultiplicityViolation {
            provider: provider_id.clone(),
            consumer: consumer_id.clone(),
            data_type: data_type.clone(),
            reason,
        }
    }

    fn consumers_for_provider<'a>(
        &'a self,
        provider_id: &InstanceId,
        data_type: &'a DataType,
    ) -> impl Iterator<Item = &'a InstanceId> {
        self.providers_by_data_type
            .get(data_type, provider_id)
            .iter()
            .filter_map(|id| self.dependencies.get(id))
            .map(|d| &d.consumer_id)
    }

    fn providers_for_consumer<'a>(
        &'a self,
        consumer_id: &InstanceId,
        data_type: &'a DataType,
    ) -> impl Iterator<Item = &'a InstanceId> {
        self.consumers_by_data_type
            .get(data_type, consumer_id)
            .iter()
            .filter_map(|id| self.dependencies.get(id))
            .map(|d| &d.provider_id)
    }

    /// Remove an edge. Returns `false` for unknown (or already removed) ids.
    pub fn remove_dependency(&mut self, id: DependencyId) -> bool {
        self.take_dependency(id).is_some()
    }

    pub(crate) fn take_dependency(&mut self, id: DependencyId) -> Option<Dependency> {
        let dep = self.dependencies.remove(&id)?;
        self.revision += 1;
        self.providers_by_data_type
            .remove(&dep.data_type, &dep.provider_id, id);
        self.consumers_by_data_type
            .remove(&dep.data_type, &dep.consumer_id, id);
        self.consumers_by_provider
            .remove(&dep.provider_id, &dep.consumer_id, id);
        self.providers_by_consumer
            .remove(&dep.consumer_id, &dep.provider_id, id);
        info!(id = %id, provider = %dep.provider_id, consumer = %dep.consumer_id, "dependency removed");
        Some(dep)
    }

    /// Remove every edge touching `instance`, on either side.
    pub fn remove_dependencies_for_instance(&mut self, instance: &InstanceId) -> Vec<Dependency> {
        let mut ids = self.consumers_by_provider.all(instance);
        ids.extend(self.providers_by_consumer.all(instance));
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.take_dependency(id))
            .collect()
    }

    pub fn get(&self, id: DependencyId) -> Option<&Dependency> {
        self.dependencies.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: DependencyId) -> Option<&mut Dependency> {
        self.dependencies.get_mut(&id)
    }

    pub fn contains(&self, id: DependencyId) -> bool {
        self.dependencies.contains_key(&id)
    }

    /// All edges, ordered by id.
    pub fn dependencies(&self) -> Vec<&Dependency> {
        let mut deps: Vec<&Dependency> = self.dependencies.values().collect();
        deps.sort_by_key(|d| d.id);
        deps
    }

    fn collect(&self, ids: Vec<DependencyId>) -> Vec<&Dependency> {
        ids.iter().filter_map(|id| self.dependencies.get(id)).collect()
    }

    pub fn get_dependencies_by_provider(&self, provider_id: &InstanceId) -> Vec<&Dependency> {
        self.collect(self.consumers_by_provider.all(provider_id))
    }

    pub fn get_dependencies_by_consumer(&self, consumer_id: &InstanceId) -> Vec<&Dependency> {
        self.collect(self.providers_by_consumer.all(consumer_id))
    }

    pub fn get_dependencies_by_data_type(&self, data_type: &DataType) -> Vec<&Dependency> {
        self.collect(self.providers_by_data_type.all(data_type))
    }

    /// Edges from `provider_id` carrying `data_type`, in creation order.
    pub fn get_dependencies_by_provider_and_type(
        &self,
        provider_id: &InstanceId,
        data_type: &DataType,
    ) -> Vec<DependencyId> {
        let mut ids = self.providers_by_data_type.get(data_type, provider_id).to_vec();
        ids.sort();
        ids
    }

    /// Edges into `consumer_id` carrying `data_type`, in creation order.
    pub fn get_dependencies_by_consumer_and_type(
        &self,
        consumer_id: &InstanceId,
        data_type: &DataType,
    ) -> Vec<DependencyId> {
        let mut ids = self.consumers_by_data_type.get(data_type, consumer_id).to_vec();
        ids.sort();
        ids
    }

    pub fn find_dependency(
        &self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
    ) -> Option<&Dependency> {
        self.consumers_by_provider
            .get(provider_id, consumer_id)
            .iter()
            .filter_map(|id| self.dependencies.get(id))
            .find(|d| &d.data_type == data_type)
    }

    pub fn providers_for_data_type(&self, data_type: &DataType) -> Vec<InstanceId> {
        self.providers_by_data_type.inner_keys(data_type)
    }

    pub fn consumers_for_data_type(&self, data_type: &DataType) -> Vec<InstanceId> {
        self.consumers_by_data_type.inner_keys(data_type)
    }

    pub fn consumers_of(&self, provider_id: &InstanceId) -> Vec<InstanceId> {
        self.consumers_by_provider.inner_keys(provider_id)
    }

    pub fn providers_of(&self, consumer_id: &InstanceId) -> Vec<InstanceId> {
        self.providers_by_consumer.inner_keys(consumer_id)
    }

    pub fn would_create_cycle(&self, provider_id: &InstanceId, consumer_id: &InstanceId) -> bool {
        FlowGraph::from_dependencies(self.dependencies.values())
            .would_close_cycle(provider_id, consumer_id)
    }

    /// Total populated inner buckets across all four indices. Zero when no edges exist.
    pub fn index_bucket_count(&self) -> usize {
        self.providers_by_data_type.bucket_count()
            + self.consumers_by_data_type.bucket_count()
            + self.consumers_by_provider.bucket_count()
            + self.providers_by_consumer.bucket_count()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
