// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster access for the stratum layer controller.
//!
//! This crate provides:
//! - The `Layer` and `GitRepository` custom resource types
//! - A trait-based K8s client abstraction for testability
//! - A production implementation using the kube crate
//! - An in-memory mock cluster for tests

mod client;
mod error;
mod kube_client;
mod mock;
mod types;

pub use client::K8sClient;
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeClient;
pub use mock::MockK8sClient;
pub use types::{
	Artifact, Condition, DynamicObject, GitRepository, GitRepositorySpec, GitRepositoryStatus,
	Layer, LayerSpec, LayerState, LayerStatus, ManagedKind, ObjectMeta, PreReqs, SourceRef,
	CONTENT_HASH_ANNOTATION, LAYER_LABEL,
};
