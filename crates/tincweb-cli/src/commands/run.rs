// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use anyhow::Context;
use clap::Args;
use tincweb_config::Config;
use tincweb_daemon::{RegistryOptions, SupervisorRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
	/// Start this network as well (repeatable)
	#[arg(long = "network", value_name = "NAME")]
	pub networks: Vec<String>,

	/// Do not start networks flagged for auto-start
	#[arg(long)]
	pub no_auto_start: bool,
}

/// Registry over the configured networks directory. Hook scripts written by
/// its supervisors call back into the current executable.
pub fn build_registry(config: &Config) -> anyhow::Result<SupervisorRegistry> {
	let executable = std::env::current_exe().context("resolve path of the running executable")?;
	let options = RegistryOptions::from_config(&config.daemon, executable);
	Ok(SupervisorRegistry::new(options, CancellationToken::new()))
}

#[instrument(skip_all)]
pub async fn handle_run(args: RunArgs, config: &Config) -> anyhow::Result<()> {
	let registry = build_registry(config)?;
	let loaded = registry.load().await?;
	info!(
		networks = loaded,
		dir = %config.daemon.networks_dir.display(),
		tincd = %config.daemon.tincd.display(),
		"starting tinc-web-boot"
	);

	if config.daemon.auto_start && !args.no_auto_start {
		registry.start_auto().await;
	}
	for name in &args.networks {
		match registry.get(name).await {
			Ok(supervisor) if supervisor.is_running() => {}
			Ok(supervisor) => supervisor.start().await,
			Err(e) => warn!(network = %name, error = %e, "cannot start network"),
		}
	}

	shutdown_signal().await;
	info!("received shutdown signal");

	registry.shutdown().await?;
	info!("shutdown complete");
	Ok(())
}

async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};
		match signal(SignalKind::terminate()) {
			Ok(mut terminate) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = terminate.recv() => {}
				}
				return;
			}
			Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
		}
	}

	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!(error = %e, "cannot listen for ctrl-c");
	}
}
