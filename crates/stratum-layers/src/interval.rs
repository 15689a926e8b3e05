// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use crate::error::{LayerError, Result};

/// Interval used when a layer's interval cannot be parsed.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Parse a duration string such as `"30s"`, `"5m"`, `"1h30m"` or `"500ms"`.
///
/// Every number needs a unit and the total must be non-zero.
pub fn parse_interval(value: &str) -> Result<Duration> {
	let invalid = |reason: String| LayerError::InvalidInterval {
		value: value.to_string(),
		reason,
	};

	let duration =
		humantime::parse_duration(value.trim()).map_err(|e| invalid(e.to_string()))?;
	if duration.is_zero() {
		return Err(invalid("must be greater than zero".to_string()));
	}
	Ok(duration)
}
