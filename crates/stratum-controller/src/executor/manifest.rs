// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Executor that applies YAML manifests of a single managed kind.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use stratum_k8s::{
	DynamicObject, K8sClient, Layer, ManagedKind, CONTENT_HASH_ANNOTATION, LAYER_LABEL,
};
use stratum_layers::source_path;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use super::{Executor, ManagedRef, ObsoleteSet};
use crate::error::ExecutorError;

/// Applies the manifests found under a layer's source path.
///
/// Every declared object is labelled with the owning layer and annotated with
/// a hash of its declared content, so drift is detected by comparing hashes
/// and obsolete objects are found by label.
pub struct ManifestExecutor {
	client: Arc<dyn K8sClient>,
	kind: ManagedKind,
	field_manager: String,
	root: PathBuf,
	default_namespace: Option<String>,
}

impl ManifestExecutor {
	pub fn new(
		client: Arc<dyn K8sClient>,
		kind: ManagedKind,
		field_manager: impl Into<String>,
		root: impl Into<PathBuf>,
	) -> Self {
		Self {
			client,
			kind,
			field_manager: field_manager.into(),
			root: root.into(),
			default_namespace: None,
		}
	}

	/// Namespace given to declared objects that do not name one.
	///
	/// Set this for namespaced kinds so declared and live objects share a
	/// namespace regardless of the client's own default.
	pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.default_namespace = Some(namespace.into());
		self
	}

	pub fn kind(&self) -> &ManagedKind {
		&self.kind
	}

	/// Objects declared by the layer's current source content.
	pub async fn declared(&self, layer: &Layer) -> Result<Vec<DynamicObject>, ExecutorError> {
		let dir = source_path(&self.root, &layer.spec.source);
		let kind = self.kind.clone();
		let name = layer.name_any();
		let namespace = self.default_namespace.clone();
		tokio::task::spawn_blocking(move || load_manifests(&dir, &kind, namespace.as_deref(), &name))
			.await?
	}
}

#[async_trait]
impl Executor for ManifestExecutor {
	#[instrument(skip(self, layer), fields(layer = %layer.name_any()))]
	async fn prune_is_required(&self, layer: &Layer) -> Result<(bool, ObsoleteSet), ExecutorError> {
		let declared: BTreeSet<ManagedRef> = self
			.declared(layer)
			.await?
			.iter()
			.map(ManagedRef::from_object)
			.collect();

		let obsolete: ObsoleteSet = self
			.client
			.list_managed(&self.kind, &layer.name_any())
			.await?
			.iter()
			.map(ManagedRef::from_object)
			.filter(|r| !declared.contains(r))
			.collect();

		debug!(obsolete = obsolete.len(), "computed obsolete objects");
		Ok((!obsolete.is_empty(), obsolete))
	}

	#[instrument(skip(self, layer, obsolete), fields(layer = %layer.name_any()))]
	async fn prune(&self, layer: &Layer, obsolete: &ObsoleteSet) -> Result<(), ExecutorError> {
		for object in obsolete {
			info!(object = %object, kind = %self.kind, "pruning object");
			self.client
				.delete_managed(&self.kind, Some(&object.namespace), &object.name)
				.await?;
		}
		Ok(())
	}

	#[instrument(skip(self, layer), fields(layer = %layer.name_any()))]
	async fn apply_is_required(&self, layer: &Layer) -> Result<bool, ExecutorError> {
		for object in self.declared(layer).await? {
			let live = self
				.client
				.get_managed(&self.kind, object.metadata.namespace.as_deref(), &object.name_any())
				.await?;
			let Some(live) = live else {
				debug!(object = %object.name_any(), "declared object missing");
				return Ok(true);
			};
			if live.annotations().get(CONTENT_HASH_ANNOTATION)
				!= object.annotations().get(CONTENT_HASH_ANNOTATION)
			{
				debug!(object = %object.name_any(), "declared object changed");
				return Ok(true);
			}
		}
		Ok(false)
	}

	#[instrument(skip(self, layer), fields(layer = %layer.name_any()))]
	async fn apply(&self, layer: &Layer) -> Result<(), ExecutorError> {
		for object in self.declared(layer).await? {
			info!(object = %object.name_any(), kind = %self.kind, "applying object");
			self.client
				.apply_managed(&self.kind, &object, &self.field_manager)
				.await?;
		}
		Ok(())
	}

	#[instrument(skip(self, layer), fields(layer = %layer.name_any()))]
	async fn apply_was_successful(&self, layer: &Layer) -> Result<bool, ExecutorError> {
		for object in self.declared(layer).await? {
			let live = self
				.client
				.get_managed(&self.kind, object.metadata.namespace.as_deref(), &object.name_any())
				.await?;
			match live {
				Some(live) if is_ready(&live) => {}
				_ => {
					debug!(object = %object.name_any(), "object not ready");
					return Ok(false);
				}
			}
		}
		Ok(true)
	}
}

/// Whether an object reports `Ready=True` for its current generation.
pub fn is_ready(object: &DynamicObject) -> bool {
	let status = &object.data["status"];
	if let Some(generation) = object.metadata.generation {
		match status["observedGeneration"].as_i64() {
			Some(observed) if observed >= generation => {}
			_ => return false,
		}
	}
	status["conditions"]
		.as_array()
		.is_some_and(|conditions| {
			conditions
				.iter()
				.any(|c| c["type"] == "Ready" && c["status"] == "True")
		})
}

/// Hex sha256 of the compact JSON encoding of a manifest.
pub fn content_hash(value: &serde_json::Value) -> String {
	hex::encode(Sha256::digest(value.to_string().as_bytes()))
}

/// Every `*.yaml` / `*.yml` file below `dir`, in sorted order.
pub fn yaml_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
	let mut files = Vec::new();
	for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
		let entry = entry?;
		if entry.file_type().is_dir() {
			continue;
		}
		if matches!(
			entry.path().extension().and_then(|e| e.to_str()),
			Some("yaml") | Some("yml")
		) {
			files.push(entry.into_path());
		}
	}
	Ok(files)
}

/// Load the objects of `kind` declared under `dir`, labelled for `layer`.
///
/// Objects without a namespace get `default_namespace` when one is given.
pub fn load_manifests(
	dir: &Path,
	kind: &ManagedKind,
	default_namespace: Option<&str>,
	layer: &str,
) -> Result<Vec<DynamicObject>, ExecutorError> {
	if !dir.is_dir() {
		return Err(ExecutorError::SourceNotFound {
			path: dir.to_path_buf(),
		});
	}

	let read_err = |path: &Path, source| ExecutorError::ManifestRead {
		path: path.to_path_buf(),
		source,
	};
	let files = yaml_files(dir).map_err(|e| read_err(dir, e))?;

	let mut objects = Vec::new();
	for path in files {
		let content = std::fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
		let invalid = |message: String| ExecutorError::InvalidManifest {
			path: path.clone(),
			message,
		};

		for document in serde_yaml::Deserializer::from_str(&content) {
			let value = serde_yaml::Value::deserialize(document).map_err(|e| invalid(e.to_string()))?;
			if value.is_null() {
				continue;
			}
			let json = serde_json::to_value(&value).map_err(|e| invalid(e.to_string()))?;
			let api_version = json["apiVersion"].as_str().unwrap_or_default();
			let object_kind = json["kind"].as_str().unwrap_or_default();
			if !kind.matches(api_version, object_kind) {
				continue;
			}

			let hash = content_hash(&json);
			let mut object: DynamicObject =
				serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
			if object.metadata.name.as_deref().unwrap_or_default().is_empty() {
				return Err(invalid(format!("{kind} without metadata.name")));
			}
			if object.metadata.namespace.is_none() {
				object.metadata.namespace = default_namespace.map(str::to_string);
			}
			object
				.labels_mut()
				.insert(LAYER_LABEL.to_string(), layer.to_string());
			object
				.annotations_mut()
				.insert(CONTENT_HASH_ANNOTATION.to_string(), hash);
			objects.push(object);
		}
	}

	debug!(dir = %dir.display(), count = objects.len(), "loaded manifests");
	Ok(objects)
}
