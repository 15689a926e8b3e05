// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kubernetes version parsing for the cluster-version gate.
//!
//! API servers report versions such as `v1.29.2+k3s1` or `v1.27.8-gke.1067004`,
//! and layers declare prerequisites such as `1.28` or `v1.26.0`. Both are
//! reduced to `major.minor.patch` and compared as semantic versions, so
//! `1.10` sorts after `1.9`.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::error::{LayerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeVersion(Version);

impl KubeVersion {
	pub fn parse(value: &str) -> Result<Self> {
		let invalid = || LayerError::InvalidVersion {
			value: value.to_string(),
		};

		let trimmed = value.trim();
		let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
		let core = trimmed
			.split(['-', '+'])
			.next()
			.filter(|core| !core.is_empty())
			.ok_or_else(invalid)?;

		let mut parts = [0u64; 3];
		let mut count = 0;
		for (i, part) in core.split('.').enumerate() {
			if i >= parts.len() {
				return Err(invalid());
			}
			parts[i] = part.parse().map_err(|_| invalid())?;
			count += 1;
		}
		if count == 0 {
			return Err(invalid());
		}

		Ok(Self(Version::new(parts[0], parts[1], parts[2])))
	}

	/// Whether this version meets a minimum requirement.
	pub fn satisfies(&self, minimum: &KubeVersion) -> bool {
		self >= minimum
	}

	pub fn as_semver(&self) -> &Version {
		&self.0
	}
}

impl PartialOrd for KubeVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for KubeVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.cmp(&other.0)
	}
}

impl fmt::Display for KubeVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}
