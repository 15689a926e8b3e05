// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Controller error types.

use std::path::PathBuf;

use stratum_k8s::K8sError;

/// Errors reported by an [`Executor`](crate::executor::Executor).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
	#[error("source directory not found: {path}")]
	SourceNotFound { path: PathBuf },

	#[error("failed to read manifest {path}: {source}")]
	ManifestRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid manifest {path}: {message}")]
	InvalidManifest { path: PathBuf, message: String },

	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error("executor task failed: {0}")]
	Task(String),
}

/// Errors raised while syncing a source artifact.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("GitRepository {namespace}/{name} has no usable artifact: {reason}")]
	InvalidArtifact {
		namespace: String,
		name: String,
		reason: String,
	},

	#[error("failed to build HTTP client: {0}")]
	Client(#[source] reqwest::Error),

	#[error("failed to download artifact from {url}: {source}")]
	Fetch {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("failed to download artifact from {url}: status {status}")]
	Status { url: String, status: u16 },

	#[error("failed to prepare working directory: {0}")]
	Workspace(#[source] std::io::Error),

	#[error("failed to extract artifact: {0}")]
	Extract(#[source] std::io::Error),

	#[error("path {path} not found in artifact")]
	MissingSourcePath { path: PathBuf },

	#[error("failed to publish {path}: {source}")]
	Publish {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error("sync task failed: {0}")]
	Task(String),
}

/// Errors returned from a reconcile pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error("reconcile pass for {name} timed out after {secs}s")]
	Timeout { name: String, secs: u64 },
}

/// Errors from the offline dependency check.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
	#[error("not a directory: {path}")]
	NotADirectory { path: PathBuf },

	#[error("failed to read {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid layer document in {path}: {source}")]
	InvalidLayer {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Errors that stop the controller from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
	#[error(transparent)]
	K8s(#[from] K8sError),

	#[error(transparent)]
	Sync(#[from] SyncError),
}

impl From<tokio::task::JoinError> for ExecutorError {
	fn from(err: tokio::task::JoinError) -> Self {
		ExecutorError::Task(err.to_string())
	}
}

impl From<tokio::task::JoinError> for SyncError {
	fn from(err: tokio::task::JoinError) -> Self {
		SyncError::Task(err.to_string())
	}
}
