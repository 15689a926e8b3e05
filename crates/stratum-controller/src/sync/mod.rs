// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact Sync: keeps the shared source tree in step with source artifacts.
//!
//! For every `GitRepository` update the artifact is downloaded and extracted,
//! each distinct path referenced by layers sourced from that repository is
//! published into the tree once, and the names of those layers are returned
//! for reconciliation.

mod fetch;
mod tree;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kube::ResourceExt;
use stratum_k8s::{GitRepository, K8sClient, SourceRef};
use stratum_layers::relative_source_path;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SyncError;

pub use fetch::{unpack, ArtifactFetcher};
pub use tree::SourceTree;

/// The parts of a `GitRepository` that Artifact Sync needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNotification {
	pub namespace: String,
	pub name: String,
	pub url: String,
	pub revision: String,
}

impl ArtifactNotification {
	pub fn from_repository(repo: &GitRepository) -> Result<Self, SyncError> {
		let namespace = repo.namespace().unwrap_or_default();
		let name = repo.name_any();
		let invalid = |reason: &str| SyncError::InvalidArtifact {
			namespace: namespace.clone(),
			name: name.clone(),
			reason: reason.to_string(),
		};

		let artifact = repo
			.status
			.as_ref()
			.and_then(|s| s.artifact.as_ref())
			.ok_or_else(|| invalid("no artifact in status"))?;
		if artifact.url.is_empty() {
			return Err(invalid("artifact url is empty"));
		}
		if artifact.revision.is_empty() {
			return Err(invalid("artifact revision is empty"));
		}

		Ok(Self {
			url: artifact.url.clone(),
			revision: artifact.revision.clone(),
			namespace,
			name,
		})
	}

	/// `namespace/name` of the repository.
	pub fn key(&self) -> String {
		format!("{}/{}", self.namespace, self.name)
	}
}

/// Result of handling one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
	/// Layers to reconcile.
	pub requests: Vec<String>,
	/// Source paths published.
	pub published: usize,
	/// Source paths that failed to publish.
	pub failed: usize,
	/// The revision had already been synced for every current source path.
	pub skipped: bool,
}

/// What was last fully published for a repository.
#[derive(Debug, Clone)]
struct Synced {
	revision: String,
	paths: BTreeSet<PathBuf>,
}

/// Layers sharing one source path.
struct PathGroup {
	source: SourceRef,
	layers: Vec<String>,
}

pub struct ArtifactSync {
	client: Arc<dyn K8sClient>,
	fetcher: ArtifactFetcher,
	tree: SourceTree,
	synced: Mutex<HashMap<String, Synced>>,
}

impl ArtifactSync {
	pub fn new(client: Arc<dyn K8sClient>, fetcher: ArtifactFetcher, tree: SourceTree) -> Self {
		Self {
			client,
			fetcher,
			tree,
			synced: Mutex::new(HashMap::new()),
		}
	}

	pub fn tree(&self) -> &SourceTree {
		&self.tree
	}

	/// Handle a repository event. Failures are logged and yield no requests.
	pub async fn handle(&self, repo: &GitRepository) -> SyncOutcome {
		let notification = match ArtifactNotification::from_repository(repo) {
			Ok(notification) => notification,
			Err(e) => {
				warn!(error = %e, "ignoring repository event");
				return SyncOutcome::default();
			}
		};

		match self.sync(&notification).await {
			Ok(outcome) => outcome,
			Err(e) => {
				warn!(repository = %notification.key(), error = %e, "artifact sync failed");
				SyncOutcome::default()
			}
		}
	}

	/// Fetch, extract and publish one artifact.
	///
	/// Each distinct source path is published once and every layer reading
	/// it is requested. Per-path publish failures are counted in the outcome
	/// rather than returned. A revision is remembered as synced, together
	/// with the paths it covered, only when every path was published.
	#[instrument(skip(self, notification), fields(repository = %notification.key(), revision = %notification.revision))]
	pub async fn sync(&self, notification: &ArtifactNotification) -> Result<SyncOutcome, SyncError> {
		let layers = self.client.list_layers().await?;
		let mut groups: BTreeMap<PathBuf, PathGroup> = BTreeMap::new();
		for layer in layers.iter().filter(|l| {
			l.spec.source.namespace == notification.namespace && l.spec.source.name == notification.name
		}) {
			groups
				.entry(relative_source_path(&layer.spec.source.path))
				.or_insert_with(|| PathGroup {
					source: layer.spec.source.clone(),
					layers: Vec::new(),
				})
				.layers
				.push(layer.name_any());
		}
		let paths: BTreeSet<PathBuf> = groups.keys().cloned().collect();

		if self.already_synced(notification, &paths) {
			debug!("revision already synced");
			return Ok(SyncOutcome {
				skipped: true,
				..SyncOutcome::default()
			});
		}

		let bytes = self.fetcher.fetch(notification).await?;

		let workspace = tempfile::Builder::new()
			.prefix("stratum-artifact-")
			.tempdir()
			.map_err(SyncError::Workspace)?;
		let dest = workspace.path().to_path_buf();
		tokio::task::spawn_blocking(move || unpack(&bytes, &dest)).await??;

		let mut outcome = SyncOutcome::default();
		for (relative, group) in groups {
			match self.tree.publish(workspace.path(), &group.source).await {
				Ok(target) => {
					debug!(path = %relative.display(), layers = ?group.layers, target = %target.display(), "published layer source");
					outcome.published += 1;
					outcome.requests.extend(group.layers);
				}
				Err(e) => {
					error!(path = %relative.display(), layers = ?group.layers, error = %e, "failed to publish layer source");
					outcome.failed += 1;
				}
			}
		}

		if outcome.failed == 0 {
			self.record_synced(notification, paths);
		}
		info!(
			published = outcome.published,
			failed = outcome.failed,
			"artifact synced"
		);
		Ok(outcome)
	}

	/// True when this revision was already published for all of `paths`.
	fn already_synced(&self, notification: &ArtifactNotification, paths: &BTreeSet<PathBuf>) -> bool {
		self.synced
			.lock()
			.map(|synced| {
				synced.get(&notification.key()).is_some_and(|last| {
					last.revision == notification.revision && paths.is_subset(&last.paths)
				})
			})
			.unwrap_or(false)
	}

	fn record_synced(&self, notification: &ArtifactNotification, paths: BTreeSet<PathBuf>) {
		if let Ok(mut synced) = self.synced.lock() {
			synced.insert(
				notification.key(),
				Synced {
					revision: notification.revision.clone(),
					paths,
				},
			);
		}
	}
}
