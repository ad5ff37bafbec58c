//! Task dependency graph and resolver.
//!
//! `TaskGraph` is built from the registry's tasks in submission order.
//! Edges point from a dependency to the task that depends on it, so a
//! topological order lists every task after all of its dependencies.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

/// Node weight: the task id plus its name for error reporting.
#[derive(Debug, Clone)]
struct Node {
    id: TaskId,
    name: String,
}

/// The task dependency graph.
///
/// Node indices follow submission order, which the resolver uses to
/// break ties between tasks that become available at the same time.
pub struct TaskGraph {
    graph: DiGraph<Node, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build a graph from tasks given in submission order.
    ///
    /// # Errors
    /// Returns `UnknownDependency` if a task depends on an id that is not
    /// among `tasks`.
    pub fn build<'a, I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let tasks: Vec<&Task> = tasks.into_iter().collect();
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut task_index = HashMap::with_capacity(tasks.len());

        for task in &tasks {
            let index = graph.add_node(Node {
                id: task.id,
                name: task.name.clone(),
            });
            task_index.insert(task.id, index);
        }

        for task in &tasks {
            let to = task_index[&task.id];
            for dep in &task.dependencies {
                let from = task_index
                    .get(dep)
                    .ok_or(Error::UnknownDependency {
                        task: task.id,
                        dependency: *dep,
                    })?;
                graph.add_edge(*from, to, ());
            }
        }

        Ok(Self { graph, task_index })
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tasks that directly depend on `id`, in submission order.
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .filter(|n| *n != index)
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors.into_iter().map(|n| self.graph[n].id).collect()
    }

    /// Resolve an execution order with Kahn's algorithm.
    ///
    /// Every task appears after all of its dependencies. Among tasks that
    /// become available together, submission order wins.
    ///
    /// # Errors
    /// Returns `Error::Cycle` naming the tasks of at least one cycle.
    pub fn resolve_order(&self) -> Result<Vec<TaskId>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(current) = queue.pop_front() {
            order.push(self.graph[current].id);

            let mut successors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .collect();
            successors.sort();
            for next in successors {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(Error::Cycle {
                tasks: self.cycle_members(),
            });
        }

        Ok(order)
    }

    /// Names of the tasks in the first cycle found, in submission order.
    fn cycle_members(&self) -> Vec<String> {
        let mut components = tarjan_scc(&self.graph);
        components.iter_mut().for_each(|c| c.sort());
        components.sort();

        let cycle = components.into_iter().find(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|n| self.graph.find_edge(*n, *n).is_some())
        });

        cycle
            .unwrap_or_default()
            .into_iter()
            .map(|index| {
                let node = &self.graph[index];
                format!("{} ({})", node.name, node.id.short())
            })
            .collect()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
