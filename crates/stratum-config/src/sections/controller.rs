// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconcile loop configuration section.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CONCURRENCY: u16 = 4;
const DEFAULT_PASS_TIMEOUT_SECS: u64 = 900;
const DEFAULT_ERROR_REQUEUE_SECS: u64 = 10;
const DEFAULT_IMMEDIATE_REQUEUE_MS: u64 = 500;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ControllerConfigLayer {
	pub concurrency: Option<u16>,
	pub pass_timeout_secs: Option<u64>,
	pub error_requeue_secs: Option<u64>,
	pub immediate_requeue_ms: Option<u64>,
}

impl ControllerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.concurrency.is_some() {
			self.concurrency = other.concurrency;
		}
		if other.pass_timeout_secs.is_some() {
			self.pass_timeout_secs = other.pass_timeout_secs;
		}
		if other.error_requeue_secs.is_some() {
			self.error_requeue_secs = other.error_requeue_secs;
		}
		if other.immediate_requeue_ms.is_some() {
			self.immediate_requeue_ms = other.immediate_requeue_ms;
		}
	}

	pub fn finalize(self) -> ControllerConfig {
		ControllerConfig {
			concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
			pass_timeout_secs: self.pass_timeout_secs.unwrap_or(DEFAULT_PASS_TIMEOUT_SECS),
			error_requeue_secs: self
				.error_requeue_secs
				.unwrap_or(DEFAULT_ERROR_REQUEUE_SECS),
			immediate_requeue_ms: self
				.immediate_requeue_ms
				.unwrap_or(DEFAULT_IMMEDIATE_REQUEUE_MS),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
	/// Maximum number of layers reconciled in parallel.
	pub concurrency: u16,
	/// Deadline for a single reconcile pass.
	pub pass_timeout_secs: u64,
	/// Requeue delay after a pass returns an error.
	pub error_requeue_secs: u64,
	/// Requeue delay used for an "immediate" requeue.
	pub immediate_requeue_ms: u64,
}

impl ControllerConfig {
	pub fn pass_timeout(&self) -> Duration {
		Duration::from_secs(self.pass_timeout_secs)
	}

	pub fn error_requeue(&self) -> Duration {
		Duration::from_secs(self.error_requeue_secs)
	}

	pub fn immediate_requeue(&self) -> Duration {
		Duration::from_millis(self.immediate_requeue_ms)
	}
}

impl Default for ControllerConfig {
	fn default() -> Self {
		ControllerConfigLayer::default().finalize()
	}
}
