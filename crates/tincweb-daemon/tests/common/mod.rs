// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared fixtures: a scripted stand-in for `tincd` and polling helpers.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tincweb_daemon::{NetworkSupervisor, SupervisorSettings};
use tincweb_network::{Network, Node};
use tokio_util::sync::CancellationToken;

/// Handles `-K` by creating the key file, then stays up until SIGTERM.
///
/// Every start appends to `starts`; a start while another instance still holds
/// the `running` marker appends to `overlaps`.
pub const LONG_RUNNING: &str = r#"#!/bin/sh
if [ "$1" = "-K" ]; then touch "$3/rsa_key.priv"; exit 0; fi
trap 'rm -f running; exit 0' TERM
echo $$ >> starts
if [ -e running ]; then echo $$ >> overlaps; fi
touch running
sleep 1000 &
wait
"#;

/// Starts fine and exits with a failure right away.
pub const CRASHING: &str = r#"#!/bin/sh
if [ "$1" = "-K" ]; then touch "$3/rsa_key.priv"; exit 0; fi
exit 3
"#;

/// Starts fine and exits with status 0 right away.
pub const CLEAN_EXIT: &str = r#"#!/bin/sh
if [ "$1" = "-K" ]; then touch "$3/rsa_key.priv"; exit 0; fi
exit 0
"#;

pub fn fake_tincd(dir: &Path, script: &str) -> PathBuf {
	let path = dir.join("fake-tincd");
	std::fs::write(&path, script).unwrap();
	std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
	path
}

pub fn settings(tincd: PathBuf) -> SupervisorSettings {
	SupervisorSettings {
		tincd,
		executable: PathBuf::from("/usr/bin/tinc-web-boot"),
	}
}

/// Creates `office` (10.10.0.0/24) with self node `home` plus the given peers.
pub async fn network_with_peers(dir: &Path, peers: &[&str]) -> Network {
	let network = Network::create(dir.join("office"), "home", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	for (i, name) in peers.iter().enumerate() {
		network
			.put(&Node {
				name: name.to_string(),
				subnet: format!("10.10.0.{}/32", i + 10).parse().unwrap(),
				port: 655,
				address: Vec::new(),
				public_key: String::new(),
				version: 0,
			})
			.await
			.unwrap();
	}
	network
}

pub async fn supervisor(dir: &Path, script: &str, peers: &[&str]) -> NetworkSupervisor {
	let tincd = fake_tincd(dir, script);
	let network = network_with_peers(dir, peers).await;
	NetworkSupervisor::new(network, settings(tincd), CancellationToken::new()).await
}

/// Polls `condition` every 20ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
	tokio::time::timeout(timeout, async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.is_ok()
}

pub fn line_count(path: &Path) -> usize {
	std::fs::read_to_string(path)
		.map(|s| s.lines().count())
		.unwrap_or(0)
}
