// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! tinc-web-boot: supervises tinc networks and receives their hook callbacks.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod version;

use commands::{CreateArgs, HookArgs, RemoveArgs, RunArgs};

#[derive(Parser, Debug)]
#[command(name = "tinc-web-boot", about = "Control plane for tinc mesh networks", version)]
struct Args {
	/// Config file (defaults to /etc/tinc-web-boot/config.toml)
	#[arg(long, global = true, env = "TINC_WEB_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the daemon: load networks, start them and supervise until interrupted
	Run(RunArgs),
	/// Report a tincd hook event to a running network (called by hook scripts)
	Hook(HookArgs),
	/// Create a network definition
	Create(CreateArgs),
	/// Delete a network definition
	Remove(RemoveArgs),
	/// List network definitions
	List,
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	match args.command {
		Command::Version => {
			println!("{}", version::format_version_info());
			Ok(())
		}
		// Hooks run inside tincd's environment; keep them off the config path.
		Command::Hook(hook) => {
			init_tracing("warn", false);
			commands::hook::handle_hook(hook).await
		}
		command => {
			let config = match &args.config {
				Some(path) => tincweb_config::load_config_with_file(path)?,
				None => tincweb_config::load_config()?,
			};
			init_tracing(&config.logging.level, config.logging.json);

			match command {
				Command::Run(run) => commands::run::handle_run(run, &config).await,
				Command::Create(create) => commands::network::handle_create(create, &config).await,
				Command::Remove(remove) => commands::network::handle_remove(remove, &config).await,
				Command::List => commands::network::handle_list(&config).await,
				Command::Hook(_) | Command::Version => Ok(()),
			}
		}
	}
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays clean.
fn init_tracing(level: &str, json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
	let registry = tracing_subscriber::registry().with(filter);
	if json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_args_are_consistent() {
		use clap::CommandFactory;
		Args::command().debug_assert();
	}

	#[test]
	fn test_global_config_flag() {
		let args =
			Args::try_parse_from(["tinc-web-boot", "list", "--config", "/tmp/custom.toml"]).unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/custom.toml")));
		assert!(matches!(args.command, Command::List));
	}

	#[test]
	fn test_hook_subcommand_parses() {
		let args = Args::try_parse_from([
			"tinc-web-boot",
			"hook",
			"--socket",
			"/var/lib/tinc/office/coordination.sock",
			"subnet-up",
			"--node",
			"alice",
			"--subnet",
			"10.10.0.2",
		])
		.unwrap();
		assert!(matches!(args.command, Command::Hook(_)));
	}
}
