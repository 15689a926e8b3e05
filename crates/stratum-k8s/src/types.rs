// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Custom resource types watched and written by the controller.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
pub use kube::api::DynamicObject;

/// Label carried by every object a layer manages.
pub const LAYER_LABEL: &str = "stratum.dev/layer";
/// Annotation holding the hash of the declared content of a managed object.
pub const CONTENT_HASH_ANNOTATION: &str = "stratum.dev/content-hash";

fn default_interval() -> String {
	"60s".to_string()
}

/// Desired state of a layer: a named group of workloads applied and pruned together.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
	group = "stratum.dev",
	version = "v1alpha1",
	kind = "Layer",
	plural = "layers",
	shortname = "lyr",
	status = "LayerStatus",
	schema = "disabled",
	printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
	printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
	pub source: SourceRef,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub hold: bool,
	#[serde(default)]
	pub prereqs: PreReqs,
	/// Requeue interval, e.g. `"30s"`, `"5m"`, `"1h"`.
	#[serde(default = "default_interval")]
	pub interval: String,
	/// Names of layers that must be deployed before this one applies.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub depends_on: Vec<String>,
}

/// Location of a layer's content inside a source repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
	pub namespace: String,
	pub name: String,
	#[serde(default)]
	pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreReqs {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub k8s_version: String,
}

/// Lifecycle state of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerState {
	Hold,
	WaitingForClusterVersion,
	PrunePending,
	Pruning,
	Pruned,
	ApplyPending,
	Applying,
	Deployed,
	Failed,
}

impl LayerState {
	pub const ALL: [LayerState; 9] = [
		LayerState::Hold,
		LayerState::WaitingForClusterVersion,
		LayerState::PrunePending,
		LayerState::Pruning,
		LayerState::Pruned,
		LayerState::ApplyPending,
		LayerState::Applying,
		LayerState::Deployed,
		LayerState::Failed,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			LayerState::Hold => "Hold",
			LayerState::WaitingForClusterVersion => "WaitingForClusterVersion",
			LayerState::PrunePending => "PrunePending",
			LayerState::Pruning => "Pruning",
			LayerState::Pruned => "Pruned",
			LayerState::ApplyPending => "ApplyPending",
			LayerState::Applying => "Applying",
			LayerState::Deployed => "Deployed",
			LayerState::Failed => "Failed",
		}
	}
}

impl std::fmt::Display for LayerState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for LayerState {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		LayerState::ALL
			.into_iter()
			.find(|state| state.as_str() == s)
			.ok_or_else(|| format!("unknown layer state '{s}'"))
	}
}

/// One entry in a layer's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
	#[serde(rename = "type")]
	pub type_: LayerState,
	#[serde(default)]
	pub version: String,
	pub last_transition_time: DateTime<Utc>,
	#[serde(default)]
	pub reason: String,
	#[serde(default)]
	pub message: String,
}

/// Observed state of a layer, owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<LayerState>,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub conditions: Vec<Condition>,
}

/// Flux source repository; only the fields the controller reads are modelled.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
	group = "source.toolkit.fluxcd.io",
	version = "v1",
	kind = "GitRepository",
	namespaced,
	status = "GitRepositoryStatus",
	schema = "disabled"
)]
pub struct GitRepositorySpec {
	#[serde(default)]
	pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitRepositoryStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifact: Option<Artifact>,
}

/// Packaged snapshot published by the source controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub revision: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub digest: Option<String>,
}

/// The kind of object a layer manages, e.g. `helm.toolkit.fluxcd.io/v2` `HelmRelease`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedKind {
	pub api_version: String,
	pub kind: String,
}

impl ManagedKind {
	pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			api_version: api_version.into(),
			kind: kind.into(),
		}
	}

	/// Split `api_version` into `(group, version)`; core types have an empty group.
	pub fn group_version(&self) -> (&str, &str) {
		match self.api_version.split_once('/') {
			Some((group, version)) => (group, version),
			None => ("", self.api_version.as_str()),
		}
	}

	/// Whether an object's `apiVersion`/`kind` pair is of this kind.
	pub fn matches(&self, api_version: &str, kind: &str) -> bool {
		self.api_version == api_version && self.kind == kind
	}
}

impl std::fmt::Display for ManagedKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.api_version, self.kind)
	}
}
