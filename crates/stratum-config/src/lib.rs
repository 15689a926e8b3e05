// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the stratum controller.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`STRATUM_*`)
//!
//! # Usage
//!
//! ```ignore
//! use stratum_config::load_config;
//!
//! let config = load_config()?;
//! println!("source tree at {}", config.sync.repos_path.display());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::StratumConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved controller configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratumConfig {
	pub controller: ControllerConfig,
	pub sync: SyncConfig,
	pub executor: ExecutorConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`STRATUM_*`)
/// 2. Config file (`/etc/stratum/controller.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<StratumConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<StratumConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<StratumConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = StratumConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: StratumConfigLayer) -> Result<StratumConfig, ConfigError> {
	let config = StratumConfig {
		controller: layer.controller.unwrap_or_default().finalize(),
		sync: layer.sync.unwrap_or_default().finalize(),
		executor: layer.executor.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		concurrency = config.controller.concurrency,
		repos_path = %config.sync.repos_path.display(),
		source_host = config.sync.source_host.as_deref().unwrap_or("-"),
		managed_kind = %config.executor.managed_kind,
		"Controller configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &StratumConfig) -> Result<(), ConfigError> {
	if config.controller.concurrency == 0 {
		return Err(ConfigError::Validation(
			"controller.concurrency must be at least 1".to_string(),
		));
	}
	if config.controller.pass_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"controller.pass_timeout_secs must be at least 1".to_string(),
		));
	}
	if config.sync.fetch_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"sync.fetch_timeout_secs must be at least 1".to_string(),
		));
	}
	if !config.sync.repos_path.is_absolute() {
		return Err(ConfigError::Validation(format!(
			"sync.repos_path must be absolute, got {}",
			config.sync.repos_path.display()
		)));
	}
	if !config.executor.managed_api_version.contains('/')
		&& config.executor.managed_api_version != "v1"
	{
		return Err(ConfigError::Validation(format!(
			"executor.managed_api_version '{}' is not a group/version",
			config.executor.managed_api_version
		)));
	}
	Ok(())
}
