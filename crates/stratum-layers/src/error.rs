// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayerError>;

#[derive(Debug, Error)]
pub enum LayerError {
	#[error("invalid interval '{value}': {reason}")]
	InvalidInterval { value: String, reason: String },

	#[error("invalid kubernetes version '{value}'")]
	InvalidVersion { value: String },

	#[error("layer {name} depends on itself")]
	SelfDependency { name: String },

	#[error("dependency cycle: {}", path.join(" -> "))]
	DependencyCycle { path: Vec<String> },
}
