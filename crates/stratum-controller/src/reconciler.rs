// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-layer reconcile pass.
//!
//! A pass loads the layer, walks the state machine once (hold, cluster
//! version gate, prune, apply behind the dependency gate, success check),
//! persists the status if it changed and returns when to run again. At most
//! one executor mutation happens per pass.

use std::sync::Arc;
use std::time::Duration;

use stratum_k8s::K8sClient;
use stratum_layers::conditions::{
	REASON_DEPENDENCY_CYCLE, REASON_INVALID_K8S_VERSION, REASON_LISTING_FAILED,
	REASON_VERSION_QUERY_FAILED,
};
use stratum_layers::{admit, resolve, DependencyCheck, KubeVersion, ManagedLayer, PassFlags};
use tracing::{debug, info, instrument, warn};

use crate::error::{ExecutorError, ReconcileError};
use crate::executor::Executor;

/// When the layer should be reconciled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
	/// Only when something changes.
	None,
	/// As soon as possible.
	Immediate,
	After(Duration),
}

impl Requeue {
	pub fn from_flags(flags: PassFlags) -> Self {
		match (flags.needs_requeue, flags.delayed) {
			(true, true) => Requeue::After(flags.delay),
			(true, false) => Requeue::Immediate,
			(false, _) => Requeue::None,
		}
	}
}

pub struct Reconciler {
	client: Arc<dyn K8sClient>,
	executor: Arc<dyn Executor>,
}

impl Reconciler {
	pub fn new(client: Arc<dyn K8sClient>, executor: Arc<dyn Executor>) -> Self {
		Self { client, executor }
	}

	pub fn client(&self) -> &Arc<dyn K8sClient> {
		&self.client
	}

	/// Run one pass for the named layer.
	///
	/// A layer that no longer exists, or is deleted before its status is
	/// written, ends the pass without a requeue.
	#[instrument(skip(self), fields(layer = %name))]
	pub async fn reconcile(&self, name: &str) -> Result<Requeue, ReconcileError> {
		let Some(layer) = self.client.get_layer(name).await? else {
			debug!("layer not found, nothing to do");
			return Ok(Requeue::None);
		};

		let mut layer = ManagedLayer::new(layer);
		self.evaluate(&mut layer).await;

		if layer.status_changed() {
			match self.client.update_layer_status(layer.layer()).await {
				Ok(()) => {}
				Err(e) if e.is_not_found() => {
					debug!("layer deleted during pass");
					return Ok(Requeue::None);
				}
				Err(e) => return Err(e.into()),
			}
		}

		let requeue = Requeue::from_flags(layer.flags());
		debug!(state = ?layer.state(), ?requeue, "pass complete");
		Ok(requeue)
	}

	/// Walk the state machine once, recording the outcome on `layer`.
	pub async fn evaluate(&self, layer: &mut ManagedLayer) {
		if let Err(e) = self.process(layer).await {
			warn!(layer = %layer.name(), error = %e, "executor failed");
			layer.set_failed(e.to_string());
		}
	}

	async fn process(&self, layer: &mut ManagedLayer) -> Result<(), ExecutorError> {
		if layer.is_hold() {
			layer.set_hold();
			return Ok(());
		}

		if !self.cluster_version_met(layer).await {
			layer.set_delayed();
			return Ok(());
		}

		let (prune_required, obsolete) = self.executor.prune_is_required(layer.layer()).await?;
		if prune_required {
			info!(layer = %layer.name(), count = obsolete.len(), "prune required");
			layer.set_pruning();
			self.executor.prune(layer.layer(), &obsolete).await?;
			layer.set_delayed();
			return Ok(());
		}
		layer.set_pruning_to_pruned();

		if self.executor.apply_is_required(layer.layer()).await? {
			if !self.dependencies_deployed(layer).await {
				layer.set_delayed();
				return Ok(());
			}
			info!(layer = %layer.name(), version = %layer.spec().version, "applying layer");
			layer.set_applying();
			self.executor.apply(layer.layer()).await?;
			layer.set_delayed();
			return Ok(());
		}

		if !self.executor.apply_was_successful(layer.layer()).await? {
			debug!(layer = %layer.name(), "waiting for applied objects to become ready");
			layer.set_delayed();
			return Ok(());
		}

		layer.set_deployed();
		Ok(())
	}

	/// False when the layer must wait, with the reason already recorded.
	async fn cluster_version_met(&self, layer: &mut ManagedLayer) -> bool {
		let Some(required) = layer.required_k8s_version().map(str::to_string) else {
			return true;
		};

		let minimum = match KubeVersion::parse(&required) {
			Ok(minimum) => minimum,
			Err(e) => {
				layer.record_warning(REASON_INVALID_K8S_VERSION, e.to_string());
				return false;
			}
		};

		let current = match self.client.server_version().await {
			Ok(current) => current,
			Err(e) => {
				warn!(layer = %layer.name(), error = %e, "failed to query cluster version");
				layer.record_warning(
					REASON_VERSION_QUERY_FAILED,
					format!("Failed to query the cluster version: {e}"),
				);
				return false;
			}
		};

		match KubeVersion::parse(&current) {
			Ok(cluster) if cluster.satisfies(&minimum) => true,
			Ok(_) => {
				debug!(layer = %layer.name(), %current, %required, "cluster version below prerequisite");
				layer.set_waiting_for_cluster_version(&required, &current);
				false
			}
			Err(e) => {
				warn!(layer = %layer.name(), %current, "unparseable cluster version");
				layer.record_warning(REASON_VERSION_QUERY_FAILED, e.to_string());
				false
			}
		}
	}

	/// False when any dependency is not yet `Deployed`, or the dependency
	/// graph cannot be evaluated.
	async fn dependencies_deployed(&self, layer: &mut ManagedLayer) -> bool {
		if layer.depends_on().is_empty() {
			return true;
		}

		let layers = match self.client.list_layers().await {
			Ok(layers) => layers,
			Err(e) => {
				warn!(layer = %layer.name(), error = %e, "failed to list layers");
				layer.record_warning(
					REASON_LISTING_FAILED,
					format!("Failed to list layers: {e}"),
				);
				return false;
			}
		};

		if let Err(e) = admit(layer.layer(), &layers) {
			warn!(layer = %layer.name(), error = %e, "dependency graph rejected");
			layer.record_warning(REASON_DEPENDENCY_CYCLE, e.to_string());
			return false;
		}

		match resolve(layer.depends_on(), &layers) {
			DependencyCheck::Satisfied => true,
			DependencyCheck::Pending { pending, missing } => {
				info!(
					layer = %layer.name(),
					pending = ?pending,
					missing = ?missing,
					"waiting for dependencies"
				);
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn requeue_follows_pass_flags() {
		let delay = Duration::from_secs(30);
		let flags = |needs_requeue, delayed| PassFlags {
			status_changed: false,
			needs_requeue,
			delayed,
			delay,
		};
		assert_eq!(Requeue::from_flags(flags(false, false)), Requeue::None);
		assert_eq!(Requeue::from_flags(flags(true, false)), Requeue::Immediate);
		assert_eq!(Requeue::from_flags(flags(true, true)), Requeue::After(delay));
	}
}
