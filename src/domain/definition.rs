//! Dependency definitions - declared capabilities of component types.

use std::fmt;
use std::sync::Arc;

use crate::domain::types::{ComponentType, DataType, DefinitionId, Role, SyncStrategy};

pub type ValidateFn<P> = Arc<dyn Fn(&P) -> bool + Send + Sync>;
pub type TransformFn<P> = Arc<dyn Fn(&P) -> P + Send + Sync>;

/// "Component type X can provide/consume data type Y."
///
/// Immutable once registered in the [`DefinitionCatalog`](super::catalog::DefinitionCatalog).
pub struct DependencyDefinition<P> {
    pub id: DefinitionId,
    pub owner: ComponentType,
    pub data_type: DataType,
    pub role: Role,
    pub required: bool,
    pub sync: SyncStrategy,
    /// Provider side: may feed more than one consumer per data type.
    pub one_to_many: bool,
    /// Consumer side: may receive from more than one provider per data type.
    pub many_to_one: bool,
    /// Permits several parallel edges for the same (provider, consumer, data type).
    pub allow_multiple: bool,
    pub priority: i32,
    pub validate: Option<ValidateFn<P>>,
    pub transform: Option<TransformFn<P>>,
}

impl<P> DependencyDefinition<P> {
    pub fn new(
        id: impl Into<DefinitionId>,
        owner: impl Into<ComponentType>,
        data_type: impl Into<DataType>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            data_type: data_type.into(),
            role,
            required: false,
            sync: SyncStrategy::default(),
            one_to_many: true,
            many_to_one: true,
            allow_multiple: false,
            priority: 0,
            validate: None,
            transform: None,
        }
    }

    pub fn provider(
        id: impl Into<DefinitionId>,
        owner: impl Into<ComponentType>,
        data_type: impl Into<DataType>,
    ) -> Self {
        Self::new(id, owner, data_type, Role::Provider)
    }

    pub fn consumer(
        id: impl Into<DefinitionId>,
        owner: impl Into<ComponentType>,
        data_type: impl Into<DataType>,
    ) -> Self {
        Self::new(id, owner, data_type, Role::Consumer)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn sync(mut self, sync: SyncStrategy) -> Self {
        self.sync = sync;
        self
    }

    pub fn one_to_many(mut self, allowed: bool) -> Self {
        self.one_to_many = allowed;
        self
    }

    pub fn many_to_one(mut self, allowed: bool) -> Self {
        self.many_to_one = allowed;
        self
    }

    pub fn allow_multiple(mut self, allowed: bool) -> Self {
        self.allow_multiple = allowed;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_validate(mut self, f: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn with_transform(mut self, f: impl Fn(&P) -> P + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn owned_by(&self, component_type: &ComponentType) -> bool {
        self.owner.matches(component_type)
    }

    /// Runs the validate hook; definitions without one accept everything.
    pub fn accepts(&self, payload: &P) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate(payload))
    }

    /// Runs the transform hook, or `None` when the payload passes through untouched.
    pub fn apply_transform(&self, payload: &P) -> Option<P> {
        self.transform.as_ref().map(|transform| transform(payload))
    }
}

// Hooks are shared behind `Arc`, so a clone is cheap and does not require `P: Clone`.
impl<P> Clone for DependencyDefinition<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            owner: self.owner.clone(),
            data_type: self.data_type.clone(),
            role: self.role,
            required: self.required,
            sync: self.sync,
            one_to_many: self.one_to_many,
            many_to_one: self.many_to_one,
            allow_multiple: self.allow_multiple,
            priority: self.priority,
            validate: self.validate.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<P> fmt::Debug for DependencyDefinition<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyDefinition")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("data_type", &self.data_type)
            .field("role", &self.role)
            .field("required", &self.required)
            .field("sync", &self.sync)
            .field("one_to_many", &self.one_to_many)
            .field("many_to_one", &self.many_to_one)
            .field("allow_multiple", &self.allow_multiple)
            .field("priority", &self.priority)
            .field("validate", &self.validate.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
