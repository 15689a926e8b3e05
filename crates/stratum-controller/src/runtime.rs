// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kube-runtime wiring: the layer controller and the artifact watcher.

use std::sync::Arc;

use futures::channel::mpsc;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, ResourceExt};
use stratum_config::{ControllerConfig, StratumConfig, SyncConfig};
use stratum_k8s::{GitRepository, K8sClient, KubeClient, Layer, ManagedKind, LAYER_LABEL};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, StartupError, SyncError};
use crate::executor::{ManifestExecutor, DEFAULT_NAMESPACE};
use crate::reconciler::{Reconciler, Requeue};
use crate::sync::{ArtifactFetcher, ArtifactSync, SourceTree};

/// Shared state handed to every reconcile pass.
pub struct Context {
	pub reconciler: Reconciler,
	pub config: ControllerConfig,
}

/// Map a pass outcome onto a controller action.
pub fn requeue_action(requeue: Requeue, config: &ControllerConfig) -> Action {
	match requeue {
		Requeue::None => Action::await_change(),
		Requeue::Immediate => Action::requeue(config.immediate_requeue()),
		Requeue::After(delay) => Action::requeue(delay),
	}
}

async fn reconcile(layer: Arc<Layer>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
	let name = layer.name_any();
	match tokio::time::timeout(ctx.config.pass_timeout(), ctx.reconciler.reconcile(&name)).await {
		Ok(requeue) => Ok(requeue_action(requeue?, &ctx.config)),
		Err(_) => Err(ReconcileError::Timeout {
			name,
			secs: ctx.config.pass_timeout_secs,
		}),
	}
}

fn error_policy(layer: Arc<Layer>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
	warn!(layer = %layer.name_any(), error = %error, "reconcile pass failed");
	Action::requeue(ctx.config.error_requeue())
}

/// The layer owning a managed object, from its label.
fn owning_layer(object: DynamicObject) -> Option<ObjectRef<Layer>> {
	object
		.labels()
		.get(LAYER_LABEL)
		.filter(|name| !name.is_empty())
		.map(|name| ObjectRef::new(name))
}

/// Create the shared source tree root if needed.
pub async fn source_tree(config: &SyncConfig) -> Result<SourceTree, SyncError> {
	tokio::fs::create_dir_all(&config.repos_path)
		.await
		.map_err(SyncError::Workspace)?;
	Ok(SourceTree::new(config.repos_path.clone()))
}

/// Run the controller until SIGINT or SIGTERM.
pub async fn run(client: KubeClient, config: StratumConfig) -> Result<(), StartupError> {
	let kube = client.client();
	let client = Arc::new(client);

	let cluster_version = client.server_version().await?;
	info!(%cluster_version, "connected to cluster");

	let kind = ManagedKind::new(
		config.executor.managed_api_version.clone(),
		config.executor.managed_kind.clone(),
	);
	let (resource, namespaced) = client.resolve(&kind).await?;
	info!(%kind, namespaced, "resolved managed kind");

	let tree = source_tree(&config.sync).await?;
	let fetcher = ArtifactFetcher::new(config.sync.fetch_timeout(), config.sync.source_host.clone())?;
	let sync = Arc::new(ArtifactSync::new(client.clone(), fetcher, tree));

	let mut executor = ManifestExecutor::new(
		client.clone(),
		kind,
		config.executor.field_manager.clone(),
		config.sync.repos_path.clone(),
	);
	if namespaced {
		executor = executor.with_default_namespace(DEFAULT_NAMESPACE);
	}
	let ctx = Arc::new(Context {
		reconciler: Reconciler::new(client.clone(), Arc::new(executor)),
		config: config.controller.clone(),
	});

	let (requests, triggers) = mpsc::unbounded();
	let repositories: Api<GitRepository> = Api::all(kube.clone());
	let sync_task = tokio::spawn(sync_artifacts(repositories, sync, requests));

	let layers: Api<Layer> = Api::all(kube.clone());
	let managed: Api<DynamicObject> = Api::all_with(kube, &resource);

	info!(
		concurrency = config.controller.concurrency,
		repos = %config.sync.repos_path.display(),
		"starting layer controller"
	);
	Controller::new(layers, watcher::Config::default())
		.with_config(controller::Config::default().concurrency(config.controller.concurrency))
		.watches_with(
			managed,
			resource,
			watcher::Config::default().labels(LAYER_LABEL),
			owning_layer,
		)
		.reconcile_on(triggers)
		.shutdown_on_signal()
		.run(reconcile, error_policy, ctx)
		.for_each(|result| async move {
			match result {
				Ok((layer, action)) => debug!(layer = %layer.name, ?action, "reconciled"),
				Err(e) => debug!(error = %e, "controller event"),
			}
		})
		.await;

	sync_task.abort();
	info!("layer controller stopped");
	Ok(())
}

/// Feed repository updates through Artifact Sync and forward the layers it
/// names to the controller.
async fn sync_artifacts(
	api: Api<GitRepository>,
	sync: Arc<ArtifactSync>,
	requests: mpsc::UnboundedSender<ObjectRef<Layer>>,
) {
	let mut events = watcher(api, watcher::Config::default())
		.default_backoff()
		.applied_objects()
		.boxed();

	while let Some(event) = events.next().await {
		match event {
			Ok(repository) => {
				let outcome = sync.handle(&repository).await;
				for name in outcome.requests {
					if requests.unbounded_send(ObjectRef::new(&name)).is_err() {
						debug!("controller gone, stopping artifact watcher");
						return;
					}
				}
			}
			Err(e) => warn!(error = %e, "repository watch error"),
		}
	}
}
