// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{DynamicObject, Layer, ManagedKind};

/// Trait for the cluster API operations the controller needs.
///
/// This abstraction keeps the reconciler and artifact sync testable against
/// an in-memory cluster while the production implementation talks to the
/// API server through kube.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Get a layer by name. Returns `Ok(None)` when it no longer exists.
	async fn get_layer(&self, name: &str) -> Result<Option<Layer>, K8sError>;

	/// List every layer in the cluster.
	async fn list_layers(&self) -> Result<Vec<Layer>, K8sError>;

	/// Persist the status subresource of a layer.
	async fn update_layer_status(&self, layer: &Layer) -> Result<(), K8sError>;

	/// The API server's git version string, e.g. `v1.29.2+k3s1`.
	async fn server_version(&self) -> Result<String, K8sError>;

	/// List objects of `kind` labelled as managed by `layer`, across namespaces.
	async fn list_managed(
		&self,
		kind: &ManagedKind,
		layer: &str,
	) -> Result<Vec<DynamicObject>, K8sError>;

	/// Get a managed object. Returns `Ok(None)` on 404.
	async fn get_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<DynamicObject>, K8sError>;

	/// Server-side apply an object with the given field manager.
	async fn apply_managed(
		&self,
		kind: &ManagedKind,
		object: &DynamicObject,
		field_manager: &str,
	) -> Result<DynamicObject, K8sError>;

	/// Delete a managed object. A missing object is not an error.
	async fn delete_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<(), K8sError>;
}
