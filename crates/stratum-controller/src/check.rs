// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Offline dependency check over Layer manifests.

use std::path::Path;

use kube::Resource;
use serde::Deserialize;
use stratum_k8s::Layer;
use stratum_layers::{check_graph, GraphIssue};

use crate::error::CheckError;
use crate::executor::yaml_files;

/// Every `Layer` document in the YAML files below `dir`.
pub fn load_layers(dir: &Path) -> Result<Vec<Layer>, CheckError> {
	if !dir.is_dir() {
		return Err(CheckError::NotADirectory {
			path: dir.to_path_buf(),
		});
	}
	let files = yaml_files(dir).map_err(|source| CheckError::Read {
		path: dir.to_path_buf(),
		source,
	})?;

	let api_version = Layer::api_version(&());
	let kind = Layer::kind(&());
	let mut layers = Vec::new();
	for path in files {
		let content = std::fs::read_to_string(&path).map_err(|source| CheckError::Read {
			path: path.clone(),
			source,
		})?;
		let invalid = |source: serde_yaml::Error| CheckError::InvalidLayer {
			path: path.clone(),
			source,
		};

		for document in serde_yaml::Deserializer::from_str(&content) {
			let value = serde_yaml::Value::deserialize(document).map_err(invalid)?;
			let is_layer = value.get("apiVersion").and_then(|v| v.as_str()) == Some(&*api_version)
				&& value.get("kind").and_then(|v| v.as_str()) == Some(&*kind);
			if is_layer {
				layers.push(serde_yaml::from_value(value).map_err(invalid)?);
			}
		}
	}
	Ok(layers)
}

/// Load the layers under `dir` and report problems with their dependency graph.
pub fn check_dir(dir: &Path) -> Result<(usize, Vec<GraphIssue>), CheckError> {
	let layers = load_layers(dir)?;
	Ok((layers.len(), check_graph(&layers)))
}
