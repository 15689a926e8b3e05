// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stratum layer controller binary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stratum_config::{LogFormat, LoggingConfig};
use stratum_controller::check::check_dir;
use stratum_k8s::KubeClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

/// Stratum - deploys layers of workloads in dependency order.
#[derive(Parser, Debug)]
#[command(
	name = "stratum-controller",
	about = "Layer reconciliation controller",
	version
)]
struct Args {
	/// Configuration file (defaults to /etc/stratum/controller.toml)
	#[arg(long, env = "STRATUM_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the controller (default)
	Run,
	/// Show version and build information
	Version,
	/// Check the dependency graph of the Layer manifests in a directory
	CheckDeps {
		/// Directory containing Layer YAML documents
		dir: PathBuf,
	},
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

fn check_deps(dir: &std::path::Path) -> anyhow::Result<ExitCode> {
	let (count, issues) =
		check_dir(dir).with_context(|| format!("failed to read layers from {}", dir.display()))?;
	if issues.is_empty() {
		println!("{count} layers, dependency graph ok");
		return Ok(ExitCode::SUCCESS);
	}
	for issue in &issues {
		eprintln!("error: {issue}");
	}
	eprintln!("{count} layers, {} problems", issues.len());
	Ok(ExitCode::FAILURE)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
	let args = Args::parse();

	match args.command {
		Some(Command::Version) => {
			println!("{}", version::format_version_info());
			return Ok(ExitCode::SUCCESS);
		}
		Some(Command::CheckDeps { ref dir }) => return check_deps(dir),
		Some(Command::Run) | None => {}
	}

	let config = match &args.config {
		Some(path) => stratum_config::load_config_with_file(path),
		None => stratum_config::load_config(),
	}
	.context("failed to load configuration")?;

	init_tracing(&config.logging);
	tracing::info!(
		version = env!("CARGO_PKG_VERSION"),
		repos = %config.sync.repos_path.display(),
		managed_kind = %config.executor.managed_kind,
		"starting stratum-controller"
	);

	let client = KubeClient::new()
		.await
		.context("failed to create Kubernetes client")?;
	stratum_controller::runtime::run(client, config)
		.await
		.context("controller failed")?;

	Ok(ExitCode::SUCCESS)
}
