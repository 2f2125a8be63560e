// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the tinc-web-boot daemon.
//!
//! Layered from multiple sources, highest precedence last:
//! 1. Built-in defaults
//! 2. TOML file (`/etc/tinc-web-boot/config.toml` or `--config`)
//! 3. Environment variables (`TINC_WEB_*`)

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::DaemonConfigFileLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
	pub daemon: DaemonConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from defaults, the system config file and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<Config, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge the given sources in precedence order and finalize the result.
pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<Config, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = DaemonConfigFileLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: DaemonConfigFileLayer) -> Result<Config, ConfigError> {
	let daemon = layer.daemon.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&daemon)?;

	info!(
		networks_dir = %daemon.networks_dir.display(),
		tincd = %daemon.tincd.display(),
		self_name = %daemon.self_name,
		graceful_shutdown_secs = daemon.graceful_shutdown_secs,
		"configuration loaded"
	);

	Ok(Config { daemon, logging })
}

/// Validate cross-field configuration rules.
fn validate_config(daemon: &DaemonConfig) -> Result<(), ConfigError> {
	if daemon.self_name.is_empty()
		|| !daemon
			.self_name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_')
	{
		return Err(ConfigError::Validation(format!(
			"self_name '{}' must only contain letters, digits and '_'",
			daemon.self_name
		)));
	}
	if daemon.graceful_shutdown_secs == 0 {
		return Err(ConfigError::Validation(
			"graceful_shutdown_secs must be greater than zero".to_string(),
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedSource(Precedence, DaemonConfigFileLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<DaemonConfigFileLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	fn daemon_layer(secs: u64) -> DaemonConfigFileLayer {
		DaemonConfigFileLayer {
			daemon: Some(DaemonConfigLayer {
				graceful_shutdown_secs: Some(secs),
				self_name: Some("host".to_string()),
				..Default::default()
			}),
			logging: None,
		}
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(FixedSource(Precedence::Environment, daemon_layer(7))),
			Box::new(FixedSource(Precedence::ConfigFile, daemon_layer(30))),
		])
		.unwrap();
		assert_eq!(config.daemon.graceful_shutdown_secs, 7);
		assert_eq!(config.logging.level, "info");
	}

	#[test]
	fn test_zero_grace_period_rejected() {
		let result = load_from_sources(vec![Box::new(FixedSource(
			Precedence::ConfigFile,
			daemon_layer(0),
		))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_invalid_self_name_rejected() {
		let layer = DaemonConfigFileLayer {
			daemon: Some(DaemonConfigLayer {
				self_name: Some("bad-name".to_string()),
				..Default::default()
			}),
			logging: None,
		};
		let result = load_from_sources(vec![Box::new(FixedSource(Precedence::ConfigFile, layer))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
