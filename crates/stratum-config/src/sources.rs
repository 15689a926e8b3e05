// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::StratumConfigLayer;
use crate::sections::{
	ControllerConfigLayer, ExecutorConfigLayer, LogFormat, LoggingConfigLayer, SyncConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<StratumConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<StratumConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(StratumConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/stratum/controller.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<StratumConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(StratumConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: StratumConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: STRATUM_<SECTION>_<FIELD>. `REPOS_PATH` and `SOURCE_HOST` are
/// still read when their prefixed forms are unset.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<StratumConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(StratumConfigLayer {
			controller: Some(load_controller_from_env()?),
			sync: Some(load_sync_from_env()?),
			executor: Some(load_executor_from_env()),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_controller_from_env() -> Result<ControllerConfigLayer, ConfigError> {
	Ok(ControllerConfigLayer {
		concurrency: env_u16("STRATUM_CONTROLLER_CONCURRENCY")?,
		pass_timeout_secs: env_u64("STRATUM_CONTROLLER_PASS_TIMEOUT_SECS")?,
		error_requeue_secs: env_u64("STRATUM_CONTROLLER_ERROR_REQUEUE_SECS")?,
		immediate_requeue_ms: env_u64("STRATUM_CONTROLLER_IMMEDIATE_REQUEUE_MS")?,
	})
}

fn load_sync_from_env() -> Result<SyncConfigLayer, ConfigError> {
	Ok(SyncConfigLayer {
		repos_path: env_var("STRATUM_REPOS_PATH").or_else(|| env_var("REPOS_PATH")),
		fetch_timeout_secs: env_u64("STRATUM_SYNC_FETCH_TIMEOUT_SECS")?,
		source_host: env_var("STRATUM_SOURCE_HOST").or_else(|| env_var("SOURCE_HOST")),
	})
}

fn load_executor_from_env() -> ExecutorConfigLayer {
	ExecutorConfigLayer {
		field_manager: env_var("STRATUM_EXECUTOR_FIELD_MANAGER"),
		managed_api_version: env_var("STRATUM_EXECUTOR_API_VERSION"),
		managed_kind: env_var("STRATUM_EXECUTOR_KIND"),
	}
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("STRATUM_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|message| {
			ConfigError::InvalidValue {
				key: "STRATUM_LOG_FORMAT".to_string(),
				message,
			}
		})?),
		None => None,
	};
	Ok(LoggingConfigLayer {
		level: env_var("STRATUM_LOG_LEVEL"),
		format,
	})
}
