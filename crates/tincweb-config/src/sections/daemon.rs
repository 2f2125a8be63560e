// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Daemon configuration section.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TINCD: &str = "tincd";
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 15;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfigLayer {
	pub networks_dir: Option<PathBuf>,
	pub tincd: Option<PathBuf>,
	pub self_name: Option<String>,
	pub graceful_shutdown_secs: Option<u64>,
	pub auto_start: Option<bool>,
}

impl DaemonConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.networks_dir.is_some() {
			self.networks_dir = other.networks_dir;
		}
		if other.tincd.is_some() {
			self.tincd = other.tincd;
		}
		if other.self_name.is_some() {
			self.self_name = other.self_name;
		}
		if other.graceful_shutdown_secs.is_some() {
			self.graceful_shutdown_secs = other.graceful_shutdown_secs;
		}
		if other.auto_start.is_some() {
			self.auto_start = other.auto_start;
		}
	}

	pub fn finalize(self) -> DaemonConfig {
		DaemonConfig {
			networks_dir: self.networks_dir.unwrap_or_else(default_networks_dir),
			tincd: self.tincd.unwrap_or_else(|| PathBuf::from(DEFAULT_TINCD)),
			self_name: self.self_name.unwrap_or_else(default_self_name),
			graceful_shutdown_secs: self
				.graceful_shutdown_secs
				.unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
			auto_start: self.auto_start.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
	/// Directory holding one sub-directory per network.
	pub networks_dir: PathBuf,
	/// Path to the tincd binary.
	pub tincd: PathBuf,
	/// Node name used for this host in newly created networks.
	pub self_name: String,
	/// Upper bound for stopping a network before it is abandoned.
	pub graceful_shutdown_secs: u64,
	/// Start networks flagged with `autoStart` when the daemon boots.
	pub auto_start: bool,
}

impl DaemonConfig {
	pub fn graceful_shutdown(&self) -> Duration {
		Duration::from_secs(self.graceful_shutdown_secs)
	}
}

impl Default for DaemonConfig {
	fn default() -> Self {
		DaemonConfigLayer::default().finalize()
	}
}

fn default_networks_dir() -> PathBuf {
	dirs::data_dir()
		.unwrap_or_else(|| PathBuf::from("/var/lib"))
		.join("tinc-web-boot")
		.join("networks")
}

fn default_self_name() -> String {
	let raw = std::env::var("HOSTNAME").unwrap_or_default();
	sanitize_node_name(&raw)
}

/// Maps an arbitrary host name onto tinc's `[A-Za-z0-9_]` alphabet.
pub(crate) fn sanitize_node_name(raw: &str) -> String {
	let name: String = raw
		.split('.')
		.next()
		.unwrap_or_default()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
		.collect();
	if name.is_empty() {
		"node".to_string()
	} else {
		name
	}
}
