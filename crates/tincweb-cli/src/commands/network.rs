// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Offline management of network definitions. A running daemon picks changes
//! up on its next start.

use crate::commands::run::build_registry;
use anyhow::Context;
use clap::Args;
use console::style;
use ipnet::IpNet;
use tincweb_config::Config;
use tincweb_network::Upgrade;
use tracing::instrument;

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
	/// Network name (letters, digits and underscores)
	pub name: String,

	/// Address space of the network, e.g. 10.10.0.0/24
	pub subnet: IpNet,

	/// Port tincd listens on
	#[arg(long)]
	pub port: Option<u16>,

	/// Start the network whenever the daemon starts
	#[arg(long)]
	pub auto_start: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
	pub name: String,
}

#[instrument(skip(config))]
pub async fn handle_create(args: CreateArgs, config: &Config) -> anyhow::Result<()> {
	let registry = build_registry(config)?;
	registry.load().await?;

	let supervisor = registry.create(&args.name, args.subnet).await?;
	let network = supervisor.definition();
	if let Some(port) = args.port {
		network
			.upgrade(Upgrade {
				port: Some(port),
				..Default::default()
			})
			.await
			.context("set port")?;
	}
	if args.auto_start {
		network.set_auto_start(true).await.context("enable auto-start")?;
	}

	let node = network.self_node().await?;
	println!("{} Created network {}", style("✓").green().bold(), style(&args.name).cyan());
	println!("  Self node: {} ({})", node.name, node.subnet);
	println!("  Directory: {}", network.root().display());
	Ok(())
}

#[instrument(skip(config))]
pub async fn handle_remove(args: RemoveArgs, config: &Config) -> anyhow::Result<()> {
	let registry = build_registry(config)?;
	registry.load().await?;

	if registry.remove(&args.name).await? {
		println!("{} Removed network {}", style("✓").green().bold(), style(&args.name).cyan());
	} else {
		println!("{} No network named {}", style("!").yellow().bold(), args.name);
	}
	Ok(())
}

pub async fn handle_list(config: &Config) -> anyhow::Result<()> {
	let registry = build_registry(config)?;
	registry.load().await?;

	let mut rows = Vec::new();
	for supervisor in registry.list().await {
		let network = supervisor.definition();
		let settings = network.read().await?;
		rows.push((
			network.name().to_string(),
			settings.subnet,
			settings.port,
			settings.auto_start,
			supervisor.peers().len(),
		));
	}
	rows.sort_by(|a, b| a.0.cmp(&b.0));

	if rows.is_empty() {
		println!("No networks in {}", config.daemon.networks_dir.display());
		return Ok(());
	}
	for (name, subnet, port, auto_start, nodes) in rows {
		let marker = if auto_start {
			style("●").green()
		} else {
			style("○").dim()
		};
		println!("{marker} {name:<16} {subnet:<18} port {port:<5} {nodes} nodes");
	}
	Ok(())
}
