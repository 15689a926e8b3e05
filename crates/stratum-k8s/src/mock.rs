// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory cluster for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::ResourceExt;

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{DynamicObject, Layer, ManagedKind, LAYER_LABEL};

type ObjectKey = (String, Option<String>, String);

/// Mock cluster implementing [`K8sClient`] over in-memory maps.
///
/// Every status write is recorded so tests can assert on the sequence of
/// persisted states. Individual operations can be made to fail.
pub struct MockK8sClient {
	layers: Mutex<BTreeMap<String, Layer>>,
	objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
	server_version: Mutex<String>,
	default_namespace: Mutex<Option<String>>,
	status_writes: Mutex<Vec<Layer>>,
	applied: Mutex<Vec<String>>,
	deleted: Mutex<Vec<String>>,
	auto_ready: AtomicBool,
	fail_list_layers: AtomicBool,
	fail_status_update: AtomicBool,
	fail_server_version: AtomicBool,
}

impl Default for MockK8sClient {
	fn default() -> Self {
		Self {
			layers: Mutex::new(BTreeMap::new()),
			objects: Mutex::new(BTreeMap::new()),
			server_version: Mutex::new("v1.29.0".to_string()),
			default_namespace: Mutex::new(None),
			status_writes: Mutex::new(Vec::new()),
			applied: Mutex::new(Vec::new()),
			deleted: Mutex::new(Vec::new()),
			auto_ready: AtomicBool::new(true),
			fail_list_layers: AtomicBool::new(false),
			fail_status_update: AtomicBool::new(false),
			fail_server_version: AtomicBool::new(false),
		}
	}
}

fn object_key(kind: &ManagedKind, namespace: Option<&str>, name: &str) -> ObjectKey {
	(kind.to_string(), namespace.map(str::to_string), name.to_string())
}

fn api_error(message: &str) -> K8sError {
	K8sError::ApiError {
		message: message.to_string(),
	}
}

impl MockK8sClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace a layer.
	pub fn insert_layer(&self, layer: Layer) {
		self.layers.lock().unwrap().insert(layer.name_any(), layer);
	}

	pub fn remove_layer(&self, name: &str) {
		self.layers.lock().unwrap().remove(name);
	}

	/// Current stored copy of a layer.
	pub fn layer(&self, name: &str) -> Option<Layer> {
		self.layers.lock().unwrap().get(name).cloned()
	}

	pub fn set_server_version(&self, version: &str) {
		*self.server_version.lock().unwrap() = version.to_string();
	}

	/// Namespace used for namespace-less requests, like a client's
	/// configured namespace. Unset, such requests stay cluster-wide.
	pub fn set_default_namespace(&self, namespace: Option<&str>) {
		*self.default_namespace.lock().unwrap() = namespace.map(str::to_string);
	}

	fn scoped(&self, namespace: Option<&str>) -> Option<String> {
		namespace
			.map(str::to_string)
			.or_else(|| self.default_namespace.lock().unwrap().clone())
	}

	/// When set, applied objects come back with a `Ready=True` condition and
	/// an up to date `observedGeneration`.
	pub fn set_auto_ready(&self, ready: bool) {
		self.auto_ready.store(ready, Ordering::SeqCst);
	}

	pub fn fail_list_layers(&self, fail: bool) {
		self.fail_list_layers.store(fail, Ordering::SeqCst);
	}

	pub fn fail_status_update(&self, fail: bool) {
		self.fail_status_update.store(fail, Ordering::SeqCst);
	}

	pub fn fail_server_version(&self, fail: bool) {
		self.fail_server_version.store(fail, Ordering::SeqCst);
	}

	/// Every layer passed to `update_layer_status`, in order.
	pub fn status_writes(&self) -> Vec<Layer> {
		self.status_writes.lock().unwrap().clone()
	}

	/// Names of applied objects, in order.
	pub fn applied(&self) -> Vec<String> {
		self.applied.lock().unwrap().clone()
	}

	/// Names of deleted objects, in order.
	pub fn deleted(&self) -> Vec<String> {
		self.deleted.lock().unwrap().clone()
	}

	/// Seed a managed object directly.
	pub fn insert_object(&self, kind: &ManagedKind, object: DynamicObject) {
		let key = object_key(kind, object.metadata.namespace.as_deref(), &object.name_any());
		self.objects.lock().unwrap().insert(key, object);
	}

	/// All stored objects of a kind.
	pub fn objects(&self, kind: &ManagedKind) -> Vec<DynamicObject> {
		let kind = kind.to_string();
		self.objects
			.lock()
			.unwrap()
			.iter()
			.filter(|((k, _, _), _)| *k == kind)
			.map(|(_, obj)| obj.clone())
			.collect()
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn get_layer(&self, name: &str) -> Result<Option<Layer>, K8sError> {
		Ok(self.layer(name))
	}

	async fn list_layers(&self) -> Result<Vec<Layer>, K8sError> {
		if self.fail_list_layers.load(Ordering::SeqCst) {
			return Err(api_error("list layers unavailable"));
		}
		Ok(self.layers.lock().unwrap().values().cloned().collect())
	}

	async fn update_layer_status(&self, layer: &Layer) -> Result<(), K8sError> {
		if self.fail_status_update.load(Ordering::SeqCst) {
			return Err(api_error("status update rejected"));
		}
		let name = layer.name_any();
		let mut layers = self.layers.lock().unwrap();
		let stored = layers.get_mut(&name).ok_or_else(|| K8sError::NotFound {
			kind: "Layer".to_string(),
			name: name.clone(),
		})?;
		stored.status = layer.status.clone();
		self.status_writes.lock().unwrap().push(layer.clone());
		Ok(())
	}

	async fn server_version(&self) -> Result<String, K8sError> {
		if self.fail_server_version.load(Ordering::SeqCst) {
			return Err(api_error("version endpoint unavailable"));
		}
		Ok(self.server_version.lock().unwrap().clone())
	}

	async fn list_managed(
		&self,
		kind: &ManagedKind,
		layer: &str,
	) -> Result<Vec<DynamicObject>, K8sError> {
		Ok(self
			.objects(kind)
			.into_iter()
			.filter(|obj| obj.labels().get(LAYER_LABEL).map(String::as_str) == Some(layer))
			.collect())
	}

	async fn get_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<DynamicObject>, K8sError> {
		let key = object_key(kind, self.scoped(namespace).as_deref(), name);
		Ok(self.objects.lock().unwrap().get(&key).cloned())
	}

	async fn apply_managed(
		&self,
		kind: &ManagedKind,
		object: &DynamicObject,
		_field_manager: &str,
	) -> Result<DynamicObject, K8sError> {
		let namespace = self.scoped(object.metadata.namespace.as_deref());
		let key = object_key(kind, namespace.as_deref(), &object.name_any());
		let mut objects = self.objects.lock().unwrap();
		let generation = objects
			.get(&key)
			.and_then(|existing| existing.metadata.generation)
			.unwrap_or(0)
			+ 1;

		let mut stored = object.clone();
		stored.metadata.namespace = namespace;
		stored.metadata.generation = Some(generation);
		if self.auto_ready.load(Ordering::SeqCst) {
			stored.data["status"] = serde_json::json!({
				"observedGeneration": generation,
				"conditions": [{ "type": "Ready", "status": "True" }]
			});
		}
		objects.insert(key, stored.clone());
		self.applied.lock().unwrap().push(object.name_any());
		Ok(stored)
	}

	async fn delete_managed(
		&self,
		kind: &ManagedKind,
		namespace: Option<&str>,
		name: &str,
	) -> Result<(), K8sError> {
		let key = object_key(kind, self.scoped(namespace).as_deref(), name);
		if self.objects.lock().unwrap().remove(&key).is_some() {
			self.deleted.lock().unwrap().push(name.to_string());
		}
		Ok(())
	}
}
