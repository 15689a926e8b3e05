// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layer domain model for the stratum controller.
//!
//! This crate provides:
//! - `ManagedLayer`, the per-pass state holder with status transitions and pass flags
//! - Bounded condition history
//! - Dependency resolution and dependency-graph admission
//! - Kubernetes version parsing for the cluster-version gate
//! - Interval parsing

pub mod conditions;
pub mod dependency;
pub mod error;
pub mod interval;
pub mod layer;
pub mod version;

pub use conditions::{push_bounded, MAX_CONDITIONS};
pub use dependency::{admit, check_graph, resolve, DependencyCheck, GraphIssue};
pub use error::{LayerError, Result};
pub use interval::{parse_interval, DEFAULT_INTERVAL};
pub use layer::{relative_source_path, source_path, ManagedLayer, PassFlags};
pub use version::KubeVersion;
