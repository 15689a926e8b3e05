// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dependency resolution and dependency-graph admission.

use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;
use stratum_k8s::{Layer, LayerState};

use crate::error::{LayerError, Result};

/// Outcome of checking a layer's dependencies against a listing of all layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyCheck {
	Satisfied,
	Pending {
		/// Dependencies that exist but are not `Deployed`.
		pending: Vec<String>,
		/// Dependencies with no matching layer.
		missing: Vec<String>,
	},
}

impl DependencyCheck {
	pub fn is_satisfied(&self) -> bool {
		matches!(self, DependencyCheck::Satisfied)
	}
}

/// Check that every named dependency reports `Deployed` in `layers`.
pub fn resolve(depends_on: &[String], layers: &[Layer]) -> DependencyCheck {
	let states: BTreeMap<String, Option<LayerState>> = layers
		.iter()
		.map(|l| (l.name_any(), l.status.as_ref().and_then(|s| s.state)))
		.collect();

	let mut pending = Vec::new();
	let mut missing = Vec::new();
	for name in depends_on {
		match states.get(name) {
			Some(Some(LayerState::Deployed)) => {}
			Some(_) => pending.push(name.clone()),
			None => missing.push(name.clone()),
		}
	}

	if pending.is_empty() && missing.is_empty() {
		DependencyCheck::Satisfied
	} else {
		DependencyCheck::Pending { pending, missing }
	}
}

/// Reject `candidate` if it depends on itself or closes a cycle with `others`.
///
/// `others` may contain a stale copy of the candidate; the candidate's own
/// edges always take precedence.
pub fn admit(candidate: &Layer, others: &[Layer]) -> Result<()> {
	let name = candidate.name_any();
	if candidate.spec.depends_on.iter().any(|dep| *dep == name) {
		return Err(LayerError::SelfDependency { name });
	}

	let mut graph = edges(others);
	graph.insert(name.clone(), candidate.spec.depends_on.clone());

	match find_cycle_from(&name, &graph) {
		Some(path) => Err(LayerError::DependencyCycle { path }),
		None => Ok(()),
	}
}

/// Problem found when checking a whole set of layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
	SelfDependency { layer: String },
	Cycle { path: Vec<String> },
	UnknownDependency { layer: String, dependency: String },
}

impl std::fmt::Display for GraphIssue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			GraphIssue::SelfDependency { layer } => write!(f, "layer {layer} depends on itself"),
			GraphIssue::Cycle { path } => write!(f, "dependency cycle: {}", path.join(" -> ")),
			GraphIssue::UnknownDependency { layer, dependency } => {
				write!(f, "layer {layer} depends on unknown layer {dependency}")
			}
		}
	}
}

/// Check a complete set of layers, reporting each distinct cycle once.
pub fn check_graph(layers: &[Layer]) -> Vec<GraphIssue> {
	let graph = edges(layers);
	let mut issues = Vec::new();

	for (layer, deps) in &graph {
		for dep in deps {
			if dep == layer {
				issues.push(GraphIssue::SelfDependency {
					layer: layer.clone(),
				});
			} else if !graph.contains_key(dep) {
				issues.push(GraphIssue::UnknownDependency {
					layer: layer.clone(),
					dependency: dep.clone(),
				});
			}
		}
	}

	let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
	for layer in graph.keys() {
		if let Some(path) = find_cycle_from(layer, &graph) {
			if path.len() <= 2 {
				// self edge, already reported
				continue;
			}
			let mut key = path[..path.len() - 1].to_vec();
			key.sort();
			if seen.insert(key) {
				issues.push(GraphIssue::Cycle { path });
			}
		}
	}

	issues
}

fn edges(layers: &[Layer]) -> BTreeMap<String, Vec<String>> {
	layers
		.iter()
		.map(|l| (l.name_any(), l.spec.depends_on.clone()))
		.collect()
}

/// Depth-first search for a path from `start` back to itself.
fn find_cycle_from(start: &str, graph: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
	let mut path = vec![start.to_string()];
	let mut visited = BTreeSet::new();
	if walk(start, start, graph, &mut path, &mut visited) {
		Some(path)
	} else {
		None
	}
}

fn walk(
	start: &str,
	node: &str,
	graph: &BTreeMap<String, Vec<String>>,
	path: &mut Vec<String>,
	visited: &mut BTreeSet<String>,
) -> bool {
	let Some(deps) = graph.get(node) else {
		return false;
	};
	for dep in deps {
		if dep == start {
			path.push(dep.clone());
			return true;
		}
		if visited.insert(dep.clone()) {
			path.push(dep.clone());
			if walk(start, dep, graph, path, visited) {
				return true;
			}
			path.pop();
		}
	}
	false
}
