//! Instance-level view of live edges, used for cycle detection.

use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graphmap::DiGraphMap;

use crate::domain::edge::Dependency;
use crate::domain::types::{ConnectionStatus, InstanceId};

/// provider -> consumer adjacency across every data type.
///
/// Edges already marked `CYCLE_DETECTED` carry no data and are left out.
pub struct FlowGraph<'a> {
    pub graph: DiGraphMap<&'a str, ()>,
}

impl<'a> FlowGraph<'a> {
    pub fn from_dependencies(dependencies: impl IntoIterator<Item = &'a Dependency>) -> Self {
        let mut graph = DiGraphMap::new();
        for dep in dependencies {
            if dep.status == ConnectionStatus::CycleDetected {
                continue;
            }
            graph.add_edge(dep.provider_id.as_str(), dep.consumer_id.as_str(), ());
        }
        Self { graph }
    }

    /// True when adding `provider -> consumer` would make data flow back into `provider`.
    pub fn would_close_cycle(&self, provider: &InstanceId, consumer: &InstanceId) -> bool {
        if provider == consumer {
            return true;
        }
        let (from, to) = (consumer.as_str(), provider.as_str());
        if !self.graph.contains_node(from) || !self.graph.contains_node(to) {
            return false;
        }
        has_path_connecting(&self.graph, from, to, None)
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::edge::EdgeMetrics;
    use crate::domain::types::{DataType, DefinitionId, DependencyId, SyncStrategy};
    use std::time::SystemTime;

    fn dep(id: u64, p: &str, c: &str, status: ConnectionStatus) -> Dependency {
        Dependency {
            id: DependencyId(id),
            provider_id: InstanceId::from(p),
            consumer_id: InstanceId::from(c),
            provider_definition_id: DefinitionId::from("p"),
            consumer_definition_id: DefinitionId::from("c"),
            data_type: DataType::from("t"),
            status,
            sync: SyncStrategy::Both,
            last_updated: SystemTime::now(),
            active: true,
            auto_update: true,
            notify_on_change: true,
            chain: None,
            metrics: EdgeMetrics::default(),
        }
    }

    #[test]
    fn test_detects_back_edge() {
        let deps = vec![
            dep(1, "a", "b", ConnectionStatus::Ready),
            dep(2, "b", "c", ConnectionStatus::Ready),
        ];
        let g = FlowGraph::from_dependencies(&deps);
        assert!(g.would_close_cycle(&InstanceId::from("c"), &InstanceId::from("a")));
        assert!(!g.would_close_cycle(&InstanceId::from("a"), &InstanceId::from("c")));
        assert!(!g.is_cyclic());
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let g = FlowGraph::from_dependencies(&[]);
        assert!(g.would_close_cycle(&InstanceId::from("a"), &InstanceId::from("a")));
    }

    #[test]
    fn test_cycle_detected_edges_ignored() {
        let deps = vec![
            dep(1, "a", "b", ConnectionStatus::Ready),
            dep(2, "b", "a", ConnectionStatus::CycleDetected),
        ];
        let g = FlowGraph::from_dependencies(&deps);
        assert!(!g.is_cyclic());
        assert!(!g.would_close_cycle(&InstanceId::from("a"), &InstanceId::from("c")));
    }
}
