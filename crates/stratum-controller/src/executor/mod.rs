// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The executor performs the create, update and delete work for a layer.
//!
//! The reconciler never touches managed objects itself. It asks an executor
//! whether pruning or applying is needed, calls at most one mutating
//! operation per pass, and asks whether the last apply became ready.

mod manifest;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;
use stratum_k8s::{DynamicObject, Layer};

use crate::error::ExecutorError;

pub use manifest::{content_hash, is_ready, load_manifests, yaml_files, ManifestExecutor};

/// Namespace assumed for objects that do not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagedRef {
	pub namespace: String,
	pub name: String,
}

impl ManagedRef {
	pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.unwrap_or(DEFAULT_NAMESPACE).to_string(),
			name: name.into(),
		}
	}

	pub fn from_object(object: &DynamicObject) -> Self {
		Self::new(object.metadata.namespace.as_deref(), object.name_any())
	}
}

impl fmt::Display for ManagedRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.namespace, self.name)
	}
}

/// Objects present in the cluster but no longer declared by a layer.
pub type ObsoleteSet = BTreeSet<ManagedRef>;

#[async_trait]
pub trait Executor: Send + Sync {
	/// Whether cluster objects owned by the layer are no longer declared.
	async fn prune_is_required(&self, layer: &Layer) -> Result<(bool, ObsoleteSet), ExecutorError>;

	/// Delete the obsolete objects.
	async fn prune(&self, layer: &Layer, obsolete: &ObsoleteSet) -> Result<(), ExecutorError>;

	/// Whether declared content differs from what is deployed.
	async fn apply_is_required(&self, layer: &Layer) -> Result<bool, ExecutorError>;

	async fn apply(&self, layer: &Layer) -> Result<(), ExecutorError>;

	/// Whether everything from the last apply reports ready.
	async fn apply_was_successful(&self, layer: &Layer) -> Result<bool, ExecutorError>;
}
