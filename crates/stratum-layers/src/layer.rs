// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-pass state holder wrapping one `Layer`.
//!
//! A `ManagedLayer` is created at the start of a reconcile pass and dropped at
//! its end. Status transitions mutate the wrapped layer's status in place and
//! set the pass flags the reconciler reads to decide whether to persist and
//! when to requeue.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use kube::ResourceExt;
use stratum_k8s::{Condition, Layer, LayerSpec, LayerState, LayerStatus, SourceRef};
use tracing::warn;

use crate::conditions::{describe, push_bounded};
use crate::interval::{parse_interval, DEFAULT_INTERVAL};

/// `root/<namespace>/<repository>/<path>`, ignoring `.`, `..` and leading `/`
/// in the declared path so the result never leaves `root`.
pub fn source_path(root: &Path, source: &SourceRef) -> PathBuf {
	let path = root.join(&source.namespace).join(&source.name);
	let relative = relative_source_path(&source.path);
	if relative.as_os_str().is_empty() {
		path
	} else {
		path.join(relative)
	}
}

/// The normal components of a declared source path.
pub fn relative_source_path(path: &str) -> PathBuf {
	Path::new(path)
		.components()
		.filter_map(|c| match c {
			Component::Normal(part) => Some(part),
			_ => None,
		})
		.collect()
}

/// Flags accumulated during one pass. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassFlags {
	pub status_changed: bool,
	pub needs_requeue: bool,
	pub delayed: bool,
	pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ManagedLayer {
	layer: Layer,
	flags: PassFlags,
}

impl ManagedLayer {
	pub fn new(layer: Layer) -> Self {
		let delay = match parse_interval(&layer.spec.interval) {
			Ok(delay) => delay,
			Err(e) => {
				warn!(layer = %layer.name_any(), error = %e, "invalid interval, using default");
				DEFAULT_INTERVAL
			}
		};
		Self {
			layer,
			flags: PassFlags {
				delay,
				..PassFlags::default()
			},
		}
	}

	pub fn name(&self) -> String {
		self.layer.name_any()
	}

	pub fn spec(&self) -> &LayerSpec {
		&self.layer.spec
	}

	pub fn layer(&self) -> &Layer {
		&self.layer
	}

	pub fn into_layer(self) -> Layer {
		self.layer
	}

	pub fn state(&self) -> Option<LayerState> {
		self.layer.status.as_ref().and_then(|s| s.state)
	}

	pub fn conditions(&self) -> &[Condition] {
		self.layer
			.status
			.as_ref()
			.map(|s| s.conditions.as_slice())
			.unwrap_or_default()
	}

	pub fn is_hold(&self) -> bool {
		self.layer.spec.hold
	}

	/// The prerequisite cluster version, if the layer declares one.
	pub fn required_k8s_version(&self) -> Option<&str> {
		let required = self.layer.spec.prereqs.k8s_version.trim();
		(!required.is_empty()).then_some(required)
	}

	pub fn depends_on(&self) -> &[String] {
		&self.layer.spec.depends_on
	}

	/// Location of the layer's content in the shared source tree.
	pub fn source_path(&self, root: &Path) -> PathBuf {
		source_path(root, &self.layer.spec.source)
	}

	pub fn flags(&self) -> PassFlags {
		self.flags
	}

	pub fn status_changed(&self) -> bool {
		self.flags.status_changed
	}

	pub fn needs_requeue(&self) -> bool {
		self.flags.needs_requeue
	}

	pub fn is_delayed(&self) -> bool {
		self.flags.delayed
	}

	pub fn delay(&self) -> Duration {
		self.flags.delay
	}

	/// Schedule the next pass after the layer's interval.
	pub fn set_delayed(&mut self) {
		self.flags.needs_requeue = true;
		self.flags.delayed = true;
	}

	/// No-op when already on hold.
	pub fn set_hold(&mut self) {
		if self.state() != Some(LayerState::Hold) {
			self.set_default_status(LayerState::Hold);
		}
	}

	/// No-op when already waiting.
	pub fn set_waiting_for_cluster_version(&mut self, required: &str, current: &str) {
		if self.state() != Some(LayerState::WaitingForClusterVersion) {
			let (reason, _) = describe(LayerState::WaitingForClusterVersion);
			self.set_status(
				LayerState::WaitingForClusterVersion,
				reason,
				format!("Cluster version {current} is below the required {required}."),
			);
		}
	}

	pub fn set_pruning(&mut self) {
		self.set_default_status(LayerState::Pruning);
	}

	/// Move a pruning layer to `Pruned`; other states are left alone.
	pub fn set_pruning_to_pruned(&mut self) {
		if matches!(
			self.state(),
			Some(LayerState::Pruning) | Some(LayerState::PrunePending)
		) {
			self.set_default_status(LayerState::Pruned);
		}
	}

	pub fn set_applying(&mut self) {
		self.set_default_status(LayerState::Applying);
	}

	/// No-op when already deployed.
	pub fn set_deployed(&mut self) {
		if self.state() != Some(LayerState::Deployed) {
			self.set_default_status(LayerState::Deployed);
		}
	}

	/// Record an executor failure. A repeat of the newest failure is not
	/// appended again, but the pass is still marked for requeue.
	pub fn set_failed(&mut self, message: impl Into<String>) {
		let message = message.into();
		let repeated = self.state() == Some(LayerState::Failed)
			&& self.conditions().last().map(|c| c.message.as_str()) == Some(message.as_str());
		if !repeated {
			let (reason, _) = describe(LayerState::Failed);
			self.set_status(LayerState::Failed, reason, message);
		}
		self.flags.needs_requeue = true;
	}

	/// Append a warning condition without changing state.
	///
	/// A layer with no state yet is recorded as `ApplyPending`. An identical
	/// warning directly after itself is not appended twice.
	pub fn record_warning(&mut self, reason: &str, message: impl Into<String>) {
		let message = message.into();
		let state = self.state().unwrap_or(LayerState::ApplyPending);
		let repeated = self.state().is_some()
			&& self
				.conditions()
				.last()
				.is_some_and(|c| c.type_ == state && c.reason == reason && c.message == message);
		if !repeated {
			self.set_status(state, reason, message);
		}
	}

	fn set_default_status(&mut self, state: LayerState) {
		let (reason, message) = describe(state);
		self.set_status(state, reason, message.to_string());
	}

	fn set_status(&mut self, state: LayerState, reason: &str, message: String) {
		let version = self.layer.spec.version.clone();
		let status = self.layer.status.get_or_insert_with(LayerStatus::default);
		push_bounded(
			&mut status.conditions,
			Condition {
				type_: state,
				version: version.clone(),
				last_transition_time: Utc::now(),
				reason: reason.to_string(),
				message,
			},
		);
		status.state = Some(state);
		status.version = version;
		self.flags.status_changed = true;
		self.flags.needs_requeue = true;
	}
}
