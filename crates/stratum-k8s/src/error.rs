// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: String, name: String },

	#[error("Conflict updating {kind} {name}: {message}")]
	Conflict {
		kind: String,
		name: String,
		message: String,
	},

	#[error("Discovery failed for {api_version}/{kind}: {message}")]
	Discovery {
		api_version: String,
		kind: String,
		message: String,
	},

	#[error("Serialization error: {message}")]
	Serialization { message: String },

	#[error("Operation timed out")]
	Timeout,
}

impl K8sError {
	/// Whether the error is a 404 from the API server.
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(ref resp) if resp.code == 409 => K8sError::Conflict {
				kind: String::new(),
				name: String::new(),
				message: resp.message.clone(),
			},
			_ => K8sError::ApiError {
				message: err.to_string(),
			},
		}
	}
}

impl From<serde_json::Error> for K8sError {
	fn from(err: serde_json::Error) -> Self {
		K8sError::Serialization {
			message: err.to_string(),
		}
	}
}
