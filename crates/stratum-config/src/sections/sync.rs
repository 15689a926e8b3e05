// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact sync configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_repos_path() -> String {
	"/repos".to_string()
}

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SyncConfigLayer {
	pub repos_path: Option<String>,
	pub fetch_timeout_secs: Option<u64>,
	pub source_host: Option<String>,
}

impl SyncConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.repos_path.is_some() {
			self.repos_path = other.repos_path;
		}
		if other.fetch_timeout_secs.is_some() {
			self.fetch_timeout_secs = other.fetch_timeout_secs;
		}
		if other.source_host.is_some() {
			self.source_host = other.source_host;
		}
	}

	pub fn finalize(self) -> SyncConfig {
		SyncConfig {
			repos_path: PathBuf::from(self.repos_path.unwrap_or_else(default_repos_path)),
			fetch_timeout_secs: self
				.fetch_timeout_secs
				.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
			source_host: self.source_host.filter(|h| !h.is_empty()),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
	/// Root of the shared source tree.
	pub repos_path: PathBuf,
	pub fetch_timeout_secs: u64,
	/// Host serving artifacts when running outside the cluster.
	pub source_host: Option<String>,
}

impl SyncConfig {
	pub fn fetch_timeout(&self) -> Duration {
		Duration::from_secs(self.fetch_timeout_secs)
	}
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfigLayer::default().finalize()
	}
}
