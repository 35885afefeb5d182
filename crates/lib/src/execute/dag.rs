//! Execution DAG for build commands.
//!
//! Commands are connected producer to consumer: if one command's declared
//! output is another's declared input, the second depends on the first.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::command::{Command, CommandId, absolutize};

use super::types::ExecuteError;

/// A DAG of distinct commands.
///
/// Each command identity appears once, however many times it was given, so
/// a module shared by several programs has exactly one owner.
pub struct ExecutionDag {
  graph: DiGraph<CommandId, ()>,
  nodes: HashMap<CommandId, NodeIndex>,
  /// Distinct commands in the order they were first given.
  commands: Vec<Command>,
}

impl ExecutionDag {
  /// Build a DAG from `commands`, resolving paths against `root`.
  ///
  /// # Errors
  ///
  /// `ConflictingOutput` if two different commands declare the same output,
  /// `CycleDetected` if the commands depend on each other in a loop.
  pub fn from_commands(commands: &[Command], root: &Path) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut distinct = Vec::new();
    let mut producers: HashMap<PathBuf, CommandId> = HashMap::new();

    for command in commands {
      if nodes.contains_key(command.id()) {
        continue;
      }

      let output = absolutize(root, command.output());
      if let Some(first) = producers.get(&output) {
        return Err(ExecuteError::ConflictingOutput {
          output,
          first: first.clone(),
          second: command.id().clone(),
        });
      }
      producers.insert(output, command.id().clone());

      let idx = graph.add_node(command.id().clone());
      nodes.insert(command.id().clone(), idx);
      distinct.push(command.clone());
    }

    for command in &distinct {
      let dependent_idx = nodes[command.id()];
      for input in command.inputs() {
        if let Some(producer) = producers.get(&absolutize(root, input)) {
          // Edge from dependency to dependent
          graph.add_edge(nodes[producer], dependent_idx, ());
        }
      }
    }

    let dag = Self {
      graph,
      nodes,
      commands: distinct,
    };

    dag.verify_acyclic()?;

    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  /// Commands organized into parallel execution waves.
  ///
  /// Each wave holds commands whose dependencies are all in earlier waves.
  /// Within a wave, commands keep the order they were given in.
  pub fn waves(&self) -> Result<Vec<Vec<CommandId>>, ExecuteError> {
    // Kahn's algorithm, one level at a time
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }
      // Node indices follow insertion order, which is command order
      ready.sort();

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
    }

    Ok(waves)
  }

  /// The direct dependencies of a command.
  pub fn dependencies(&self, id: &CommandId) -> Vec<CommandId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect()
  }

  pub fn command(&self, id: &CommandId) -> Option<&Command> {
    self.nodes.get(id).map(|&idx| &self.commands[idx.index()])
  }

  /// Distinct commands in the order they were given.
  pub fn commands(&self) -> &[Command] {
    &self.commands
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}
