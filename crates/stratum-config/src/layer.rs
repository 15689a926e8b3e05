// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	ControllerConfigLayer, ExecutorConfigLayer, LoggingConfigLayer, SyncConfigLayer,
};

/// Controller configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StratumConfigLayer {
	#[serde(default)]
	pub controller: Option<ControllerConfigLayer>,
	#[serde(default)]
	pub sync: Option<SyncConfigLayer>,
	#[serde(default)]
	pub executor: Option<ExecutorConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl StratumConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: StratumConfigLayer) {
		merge_option(
			&mut self.controller,
			other.controller,
			ControllerConfigLayer::merge,
		);
		merge_option(&mut self.sync, other.sync, SyncConfigLayer::merge);
		merge_option(&mut self.executor, other.executor, ExecutorConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}
