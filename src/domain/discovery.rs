//! Discovery - tracks mounted instances and connects compatible pairs.
//!
//! A scan looks at every data type that has both provider and consumer
//! definitions, pairs every active provider instance with every active consumer
//! instance, drops pairs that already have an edge and then suggests (and,
//! under [`AutoConnect::Automatic`], creates) the rest. Re-running a scan with
//! no state change creates nothing and suggests nothing: pending suggestions and
//! pairs the registry refused are remembered until one side changes state or
//! the edge set changes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::domain::edge::DependencyOptions;
use crate::domain::error::{FlowError, FlowResult};
use crate::domain::events::FlowEvent;
use crate::domain::manager::DependencyManager;
use crate::domain::types::{
    ComponentType, DataType, DependencyId, InstanceId, InstanceState, PanelId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRegistration {
    pub instance_id: InstanceId,
    pub panel_id: PanelId,
    pub component_type: ComponentType,
    pub state: InstanceState,
}

impl InstanceRegistration {
    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Active
    }
}

/// What a scan does with an eligible pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoConnect {
    /// Emit the suggestion, then create the edge in the same pass.
    #[default]
    Automatic,
    /// Emit the suggestion only; edges are created through `accept_suggestion`.
    SuggestOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Suggestion {
    pub provider_id: InstanceId,
    pub consumer_id: InstanceId,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub suggested: Vec<Suggestion>,
    pub created: Vec<DependencyId>,
    /// Pairs the registry refused (multiplicity limits)
    pub rejected: usize,
}

struct Candidate {
    suggestion: Suggestion,
    provider_type: ComponentType,
    consumer_type: ComponentType,
}

#[derive(Debug, Default)]
pub struct Discovery {
    instances: BTreeMap<InstanceId, InstanceRegistration>,
    auto_connect: AutoConnect,
    pending: HashSet<Suggestion>,
    /// Pairs `connect` refused, valid while the registry stays at `rejected_at`
    rejected: HashSet<Suggestion>,
    rejected_at: u64,
    dirty: bool,
}

impl Discovery {
    pub fn new(auto_connect: AutoConnect) -> Self {
        Self {
            auto_connect,
            ..Self::default()
        }
    }

    pub fn auto_connect(&self) -> AutoConnect {
        self.auto_connect
    }

    pub fn set_auto_connect(&mut self, auto_connect: AutoConnect) {
        self.auto_connect = auto_connect;
    }

    /// Whether registrations changed since the last scan.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&InstanceRegistration> {
        self.instances.get(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceRegistration> {
        self.instances.values()
    }

    pub fn instances_in_panel(&self, panel_id: &PanelId) -> Vec<InstanceId> {
        self.instances
            .values()
            .filter(|r| &r.panel_id == panel_id)
            .map(|r| r.instance_id.clone())
            .collect()
    }

    pub fn pending_suggestions(&self) -> Vec<Suggestion> {
        let mut pending: Vec<Suggestion> = self.pending.iter().cloned().collect();
        pending.sort();
        pending
    }

    fn forget(&mut self, instance_id: &InstanceId) {
        let untouched =
            |s: &Suggestion| &s.provider_id != instance_id && &s.consumer_id != instance_id;
        self.pending.retain(untouched);
        self.rejected.retain(untouched);
    }

    pub fn register_instance<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
        instance_id: InstanceId,
        panel_id: PanelId,
        component_type: ComponentType,
    ) {
        if self.instances.contains_key(&instance_id) {
            warn!(instance = %instance_id, "instance re-registered, replacing");
            self.forget(&instance_id);
        }
        debug!(instance = %instance_id, panel = %panel_id, component = %component_type, "instance registered");
        self.instances.insert(
            instance_id.clone(),
            InstanceRegistration {
                instance_id: instance_id.clone(),
                panel_id: panel_id.clone(),
                component_type,
                state: InstanceState::Registered,
            },
        );
        self.dirty = true;
        manager.publish(FlowEvent::InstanceChanged {
            instance_id,
            panel_id,
            state: InstanceState::Registered,
        });
    }

    /// Focus (`true`) or blur (`false`) an instance.
    pub fn set_active<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
        instance_id: &InstanceId,
        active: bool,
    ) -> FlowResult<()> {
        let registration = self
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| FlowError::UnknownInstance(instance_id.clone()))?;
        let next = if active {
            InstanceState::Active
        } else {
            InstanceState::Inactive
        };
        if registration.state == next {
            return Ok(());
        }
        registration.state = next;
        let panel_id = registration.panel_id.clone();
        self.forget(instance_id);
        self.dirty = true;
        manager.publish(FlowEvent::InstanceChanged {
            instance_id: instance_id.clone(),
            panel_id,
            state: next,
        });
        Ok(())
    }

    /// Drop an instance and every edge touching it. Returns the number of edges removed.
    pub fn unregister_instance<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
        instance_id: &InstanceId,
    ) -> FlowResult<usize> {
        let registration = self
            .instances
            .remove(instance_id)
            .ok_or_else(|| FlowError::UnknownInstance(instance_id.clone()))?;
        self.forget(instance_id);
        let removed = manager.remove_dependencies_for_instance(instance_id);
        self.dirty = true;
        info!(instance = %instance_id, edges = removed, "instance unregistered");
        manager.publish(FlowEvent::InstanceChanged {
            instance_id: registration.instance_id,
            panel_id: registration.panel_id,
            state: InstanceState::Unregistered,
        });
        Ok(removed)
    }

    /// Unregister every instance hosted by `panel_id`. Returns the instances removed.
    pub fn close_panel<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
        panel_id: &PanelId,
    ) -> Vec<InstanceId> {
        let members = self.instances_in_panel(panel_id);
        for id in &members {
            if let Err(e) = self.unregister_instance(manager, id) {
                debug!(error = %e, "panel member already gone");
            }
        }
        debug!(panel = %panel_id, instances = members.len(), "panel closed");
        members
    }

    fn candidates<P: Send + Sync + 'static>(&self, manager: &DependencyManager<P>) -> Vec<Candidate> {
        let registry = manager.registry();
        let catalog = registry.catalog();
        let active: Vec<&InstanceRegistration> =
            self.instances.values().filter(|r| r.is_active()).collect();
        if active.len() < 2 {
            return Vec::new();
        }

        let mut out = Vec::new();
        for data_type in catalog.data_types() {
            let compatible = catalog.find_compatible(&data_type);
            if !compatible.is_connectable() {
                continue;
            }
            let providers = active.iter().filter(|r| {
                compatible
                    .providers
                    .iter()
                    .any(|d| d.owned_by(&r.component_type))
            });
            for provider in providers {
                let consumers = active.iter().filter(|r| {
                    compatible
                        .consumers
                        .iter()
                        .any(|d| d.owned_by(&r.component_type))
                });
                for consumer in consumers {
                    if provider.instance_id == consumer.instance_id {
                        continue;
                    }
                    if registry
                        .find_dependency(&provider.instance_id, &consumer.instance_id, &data_type)
                        .is_some()
                    {
                        continue;
                    }
                    out.push(Candidate {
                        suggestion: Suggestion {
                            provider_id: provider.instance_id.clone(),
                            consumer_id: consumer.instance_id.clone(),
                            data_type: data_type.clone(),
                        },
                        provider_type: provider.component_type.clone(),
                        consumer_type: consumer.component_type.clone(),
                    });
                }
            }
        }
        out
    }

    pub fn scan<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
    ) -> ScanReport {
        self.dirty = false;
        if manager.registry().revision() != self.rejected_at {
            self.rejected.clear();
        }
        let candidates = self.candidates(manager);
        let mut report = ScanReport::default();

        // forget pairs that are no longer eligible
        let eligible: HashSet<&Suggestion> = candidates.iter().map(|c| &c.suggestion).collect();
        self.pending.retain(|s| eligible.contains(s));
        self.rejected.retain(|s| eligible.contains(s));

        for candidate in candidates {
            let Candidate {
                suggestion,
                provider_type,
                consumer_type,
            } = candidate;

            let remembered = match self.auto_connect {
                AutoConnect::SuggestOnly => self.pending.contains(&suggestion),
                AutoConnect::Automatic => self.rejected.contains(&suggestion),
            };
            if remembered {
                continue;
            }
            manager.publish(FlowEvent::ConnectionSuggested {
                provider_id: suggestion.provider_id.clone(),
                consumer_id: suggestion.consumer_id.clone(),
                data_type: suggestion.data_type.clone(),
            });
            report.suggested.push(suggestion.clone());

            match self.auto_connect {
                AutoConnect::SuggestOnly => {
                    self.pending.insert(suggestion);
                }
                AutoConnect::Automatic => {
                    let options = DependencyOptions::with_types(provider_type, consumer_type);
                    match manager.connect(
                        &suggestion.provider_id,
                        &suggestion.consumer_id,
                        &suggestion.data_type,
                        options,
                    ) {
                        Ok(id) => report.created.push(id),
                        Err(e) => {
                            debug!(error = %e, "discovered pair not connected");
                            report.rejected += 1;
                            self.rejected.insert(suggestion);
                        }
                    }
                }
            }
        }

        self.rejected_at = manager.registry().revision();

        if !report.created.is_empty() || !report.suggested.is_empty() {
            info!(
                suggested = report.suggested.len(),
                created = report.created.len(),
                rejected = report.rejected,
                "discovery scan"
            );
        }
        report
    }

    /// Confirm a pending suggestion and create its edge.
    pub fn accept_suggestion<P: Send + Sync + 'static>(
        &mut self,
        manager: &mut DependencyManager<P>,
        suggestion: &Suggestion,
    ) -> FlowResult<DependencyId> {
        let provider_type = self
            .instances
            .get(&suggestion.provider_id)
            .map(|r| r.component_type.clone())
            .ok_or_else(|| FlowError::UnknownInstance(suggestion.provider_id.clone()))?;
        let consumer_type = self
            .instances
            .get(&suggestion.consumer_id)
            .map(|r| r.component_type.clone())
            .ok_or_else(|| FlowError::UnknownInstance(suggestion.consumer_id.clone()))?;
        self.pending.remove(suggestion);
        manager.connect(
            &suggestion.provider_id,
            &suggestion.consumer_id,
            &suggestion.data_type,
            DependencyOptions::with_types(provider_type, consumer_type),
        )
    }
}
