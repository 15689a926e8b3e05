// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use async_trait::async_trait;
use kube::{
	api::{Api, ApiResource, DeleteParams, ListParams, Patch, PatchParams},
	discovery::{self, Scope},
	core::GroupVersionKind,
	Client, ResourceExt,
};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{DynamicObject, Layer, ManagedKind, LAYER_LABEL};

#[derive(Clone)]
struct Resolved {
	resource: ApiResource,
	namespaced: bool,
}

/// Production K8s client implementation using the kube crate.
pub struct KubeClient {
	client: Client,
	resolved: RwLock<HashMap<ManagedKind, Resolved>>,
}

impl KubeClient {
	/// Create a new KubeClient that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self::from_client(client))
	}

	/// Wrap an existing kube client.
	pub fn from_client(client: Client) -> Self {
		Self {
			client,
			resolved: RwLock::new(HashMap::new()),
		}
	}

	/// The underlying kube client, for building watchers.
	pub fn client(&self) -> Client {
		self.client.clone()
	}

	/// Resolve a managed kind through API discovery, caching the result.
	pub async fn resolve(&self, kind: &ManagedKind) -> Result<(ApiResource, bool), K8sError> {
		if let Some(resolved) = self.resolved.read().await.get(kind) {
			return Ok((resolved.resource.clone(), resolved.namespaced));
		}

		let (group, version) = kind.group_version();
		let gvk = GroupVersionKind::gvk(group, version, &kind.kind);
		let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
			.await
			.map_err(|e| K8sError::Discovery {
				api_version: kind.api_version.clone(),
				kind: kind.kind.clone(),
				message: e.to_string(),
			})?;
		let namespaced = matches!(capabilities.scope, Scope::Namespaced);
		debug!(kind = %kind, namespaced, "resolved managed kind");

		self.resolved.write().await.insert(
			kind.clone(),
			Resolved {
				resource: resource.clone(),
				namespaced,
			},
		);
		Ok((resource, namespaced))
	}

	async fn scoped_api(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
	) -> Result<Api<DynamicObject>, K8sError> {
		let (resource, namespaced) = self.resolve(kind).await?;
		Ok(match (namespaced, namespace) {
			(true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
			(true, None) => Api::default_namespaced_with(self.client.clone(), &resource),
			(false, _) => Api::all_with(self.client.clone(), &resource),
		})
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn get_layer(&self, name: &str) -> Result<Option<Layer>, K8sError> {
		let layers: Api<Layer> = Api::all(self.client.clone());
		Ok(layers.get_opt(name).await?)
	}

	async fn list_layers(&self) -> Result<Vec<Layer>, K8sError> {
		let layers: Api<Layer> = Api::all(self.client.clone());
		let list = layers.list(&ListParams::default()).await?;
		Ok(list.items)
	}

	#[instrument(skip(self, layer), fields(layer = %layer.name_any()))]
	async fn update_layer_status(&self, layer: &Layer) -> Result<(), K8sError> {
		let layers: Api<Layer> = Api::all(self.client.clone());
		let patch = serde_json::json!({ "status": layer.status });
		match layers
			.patch_status(&layer.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
			.await
		{
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => Err(K8sError::NotFound {
				kind: "Layer".into(),
				name: layer.name_any(),
			}),
			Err(e) => Err(e.into()),
		}
	}

	async fn server_version(&self) -> Result<String, K8sError> {
		let info = self.client.apiserver_version().await?;
		Ok(info.git_version)
	}

	async fn list_managed(
		&self,
		kind: &ManagedKind,
		layer: &str,
	) -> Result<Vec<DynamicObject>, K8sError> {
		let (resource, _) = self.resolve(kind).await?;
		let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
		let lp = ListParams::default().labels(&format!("{LAYER_LABEL}={layer}"));
		Ok(api.list(&lp).await?.items)
	}

	async fn get_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<DynamicObject>, K8sError> {
		let api = self.scoped_api(kind, namespace).await?;
		Ok(api.get_opt(name).await?)
	}

	#[instrument(skip(self, object), fields(kind = %kind, name = %object.name_any()))]
	async fn apply_managed(
		&self,
		kind: &ManagedKind,
		object: &DynamicObject,
		field_manager: &str,
	) -> Result<DynamicObject, K8sError> {
		let api = self
			.scoped_api(kind, object.metadata.namespace.as_deref())
			.await?;
		let pp = PatchParams::apply(field_manager).force();
		Ok(api.patch(&object.name_any(), &pp, &Patch::Apply(object)).await?)
	}

	async fn delete_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<(), K8sError> {
		let api = self.scoped_api(kind, namespace).await?;
		match api.delete(name, &DeleteParams::default()).await {
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				debug!(kind = %kind, name, "managed object already gone");
				Ok(())
			}
			Err(e) => Err(e.into()),
		}
	}
}
