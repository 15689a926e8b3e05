// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use stratum_k8s::{Condition, LayerState};

/// Maximum number of conditions retained in a layer's status.
pub const MAX_CONDITIONS: usize = 10;

pub const REASON_HOLD: &str = "LayerHold";
pub const REASON_K8S_VERSION: &str = "K8sVersionNotMet";
pub const REASON_PRUNE_PENDING: &str = "PrunePending";
pub const REASON_PRUNING: &str = "PruningObsoleteObjects";
pub const REASON_PRUNED: &str = "ObsoleteObjectsPruned";
pub const REASON_APPLY_PENDING: &str = "ApplyPending";
pub const REASON_APPLYING: &str = "ApplyingObjects";
pub const REASON_DEPLOYED: &str = "LayerDeployed";
pub const REASON_FAILED: &str = "ExecutorFailed";
pub const REASON_VERSION_QUERY_FAILED: &str = "ClusterVersionUnavailable";
pub const REASON_INVALID_K8S_VERSION: &str = "InvalidK8sVersion";
pub const REASON_LISTING_FAILED: &str = "LayerListingFailed";
pub const REASON_DEPENDENCY_CYCLE: &str = "DependencyCycle";

/// Default reason and message recorded when a layer enters `state`.
pub fn describe(state: LayerState) -> (&'static str, &'static str) {
	match state {
		LayerState::Hold => (REASON_HOLD, "Layer is on hold, no changes will be made."),
		LayerState::WaitingForClusterVersion => (
			REASON_K8S_VERSION,
			"Waiting for the cluster to reach the required Kubernetes version.",
		),
		LayerState::PrunePending => (REASON_PRUNE_PENDING, "Waiting to prune obsolete objects."),
		LayerState::Pruning => (REASON_PRUNING, "Pruning objects no longer declared by the layer."),
		LayerState::Pruned => (REASON_PRUNED, "Obsolete objects have been pruned."),
		LayerState::ApplyPending => (
			REASON_APPLY_PENDING,
			"Waiting for layer dependencies to be deployed.",
		),
		LayerState::Applying => (REASON_APPLYING, "Applying declared objects."),
		LayerState::Deployed => (REASON_DEPLOYED, ""),
		LayerState::Failed => (REASON_FAILED, ""),
	}
}

/// Append a condition, evicting the oldest entries beyond [`MAX_CONDITIONS`].
pub fn push_bounded(conditions: &mut Vec<Condition>, condition: Condition) {
	conditions.push(condition);
	if conditions.len() > MAX_CONDITIONS {
		let excess = conditions.len() - MAX_CONDITIONS;
		conditions.drain(..excess);
	}
}
