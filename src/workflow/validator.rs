//! Workflow Graph Validation
//!
//! Checks run on every graph before it may be emitted:
//! - Every artifact is either produced or physically located
//! - Every input of every included instance resolves to an artifact
//! - Every edge joins a producer output to a consumer input
//! - Producers always belong to a strictly earlier stage than consumers
//! - The graph is acyclic (topological sort)

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use super::model::WorkflowGraph;
use crate::error::{GraphError, Result};

/// Rejects any edge whose producer stage is not strictly before the consumer stage.
///
/// Stage declaration order is what keeps expansion free of back-references;
/// this check makes that an enforced property instead of an assumption.
pub fn check_stage_order(graph: &WorkflowGraph) -> Result<()> {
    for edge in &graph.edges {
        let (Some(producer), Some(consumer)) = (
            graph.get_instance(&edge.producer),
            graph.get_instance(&edge.consumer),
        ) else {
            continue;
        };

        let producer_index = graph.stage_index(&producer.stage);
        let consumer_index = graph.stage_index(&consumer.stage);

        if producer_index >= consumer_index {
            return Err(GraphError::OutOfOrderDependency {
                producer: producer.id.clone(),
                producer_stage: producer.stage.clone(),
                consumer: consumer.id.clone(),
                consumer_stage: consumer.stage.clone(),
            });
        }
    }

    Ok(())
}

/// Orders instance ids so that producers come before consumers (Kahn's algorithm).
///
/// Ties are broken by expansion order, so the result is deterministic.
/// Fails with [`GraphError::CyclicDependency`] naming the instances left over.
pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<String>> {
    let position: HashMap<&str, usize> = graph
        .instances
        .iter()
        .enumerate()
        .map(|(index, i)| (i.id.as_str(), index))
        .collect();

    let mut in_degree: HashMap<&str, usize> = position.keys().map(|id| (*id, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &graph.edges {
        if let Some(degree) = in_degree.get_mut(edge.consumer.as_str()) {
            *degree += 1;
            successors
                .entry(edge.producer.as_str())
                .or_default()
                .push(edge.consumer.as_str());
        }
    }
    for children in successors.values_mut() {
        children.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
    }

    // Start with root instances (in-degree = 0)
    let mut queue: VecDeque<&str> = graph
        .instances
        .iter()
        .map(|i| i.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted_order: Vec<String> = Vec::with_capacity(graph.instances.len());

    while let Some(current_id) = queue.pop_front() {
        sorted_order.push(current_id.to_string());

        let Some(children) = successors.get(current_id) else {
            continue;
        };
        for &successor_id in children {
            if let Some(degree) = in_degree.get_mut(successor_id) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(successor_id);
                }
            }
        }
    }

    if sorted_order.len() != graph.instances.len() {
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        stuck.sort();
        return Err(GraphError::CyclicDependency(stuck));
    }

    debug!("Topological order: {:?}", sorted_order);
    Ok(sorted_order)
}

/// Validates the full graph. A graph that passes is safe to emit.
pub fn validate_graph(graph: &WorkflowGraph) -> Result<()> {
    info!(
        "Validating workflow graph '{}' with {} jobs",
        graph.name,
        graph.len()
    );

    for artifact in graph.artifacts.values() {
        if !artifact.is_resolvable() {
            let consumer = artifact.consumers.first().cloned().unwrap_or_default();
            return Err(GraphError::UnresolvedDependency {
                job: consumer,
                artifact: artifact.name.to_string(),
            });
        }
    }

    for instance in &graph.instances {
        for input in &instance.inputs {
            if !graph.artifacts.contains_key(input) {
                return Err(GraphError::UnresolvedDependency {
                    job: instance.id.clone(),
                    artifact: input.to_string(),
                });
            }
        }
    }

    for edge in &graph.edges {
        let linked = match (
            graph.get_instance(&edge.producer),
            graph.get_instance(&edge.consumer),
        ) {
            (Some(producer), Some(consumer)) => {
                consumer.inputs.iter().any(|name| producer.produces(name))
            }
            _ => false,
        };

        if !linked {
            return Err(GraphError::UnresolvedDependency {
                job: edge.consumer.clone(),
                artifact: format!("<output of {}>", edge.producer),
            });
        }
    }

    check_stage_order(graph)?;
    topological_order(graph)?;

    info!(
        "Workflow graph validated: {} jobs, {} dependencies",
        graph.len(),
        graph.edges.len()
    );
    Ok(())
}
