// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Manifest executor configuration section.

use serde::Deserialize;

fn default_field_manager() -> String {
	"stratum-controller".to_string()
}

fn default_api_version() -> String {
	"helm.toolkit.fluxcd.io/v2".to_string()
}

fn default_kind() -> String {
	"HelmRelease".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExecutorConfigLayer {
	pub field_manager: Option<String>,
	pub managed_api_version: Option<String>,
	pub managed_kind: Option<String>,
}

impl ExecutorConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.field_manager.is_some() {
			self.field_manager = other.field_manager;
		}
		if other.managed_api_version.is_some() {
			self.managed_api_version = other.managed_api_version;
		}
		if other.managed_kind.is_some() {
			self.managed_kind = other.managed_kind;
		}
	}

	pub fn finalize(self) -> ExecutorConfig {
		ExecutorConfig {
			field_manager: self.field_manager.unwrap_or_else(default_field_manager),
			managed_api_version: self
				.managed_api_version
				.unwrap_or_else(default_api_version),
			managed_kind: self.managed_kind.unwrap_or_else(default_kind),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
	/// Field manager name used for server-side apply.
	pub field_manager: String,
	pub managed_api_version: String,
	pub managed_kind: String,
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		ExecutorConfigLayer::default().finalize()
	}
}
