// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stratum layer controller.
//!
//! This crate provides:
//! - The per-layer `Reconciler` and its requeue policy
//! - The `Executor` contract and a manifest executor for one managed kind
//! - Artifact Sync, which publishes source artifacts into the shared tree
//! - kube-runtime wiring for the `stratum-controller` binary

pub mod check;
pub mod error;
pub mod executor;
pub mod reconciler;
pub mod runtime;
pub mod sync;

pub use error::{CheckError, ExecutorError, ReconcileError, StartupError, SyncError};
pub use executor::{Executor, ManagedRef, ManifestExecutor, ObsoleteSet};
pub use reconciler::{Reconciler, Requeue};
pub use sync::{ArtifactFetcher, ArtifactNotification, ArtifactSync, SourceTree, SyncOutcome};
