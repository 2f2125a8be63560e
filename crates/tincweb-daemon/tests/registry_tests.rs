// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Registry operations with running networks.

#![cfg(unix)]

mod common;

use common::{eventually, fake_tincd, LONG_RUNNING};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tincweb_daemon::{RegistryError, RegistryOptions, SupervisorRegistry};
use tokio_util::sync::CancellationToken;

const GRACE: Duration = Duration::from_secs(3);

/// Ignores SIGTERM so only the grace period ends it.
const STUBBORN: &str = r#"#!/bin/sh
if [ "$1" = "-K" ]; then touch "$3/rsa_key.priv"; exit 0; fi
trap '' TERM
while true; do sleep 1; done
"#;

/// Like [`STUBBORN`] with a background child that also ignores SIGTERM.
const STUBBORN_WITH_CHILD: &str = r#"#!/bin/sh
if [ "$1" = "-K" ]; then touch "$3/rsa_key.priv"; exit 0; fi
trap '' TERM
sleep 1000 &
echo $! > grandchild
while true; do sleep 1; done
"#;

fn registry(dir: &Path, script: &str, grace: Duration) -> SupervisorRegistry {
	SupervisorRegistry::new(
		RegistryOptions {
			networks_dir: dir.join("networks"),
			tincd: fake_tincd(dir, script),
			executable: "/usr/bin/tinc-web-boot".into(),
			self_name: "home".to_string(),
			graceful_shutdown: grace,
		},
		CancellationToken::new(),
	)
}

#[tokio::test]
async fn test_create_start_stop_scenario() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), LONG_RUNNING, GRACE);

	registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let office = registry.get("office").await.unwrap();
	assert!(!office.is_running());

	office.start().await;
	assert!(eventually(Duration::from_secs(2), || office.is_running()).await);

	office.stop().await;
	assert!(eventually(GRACE, || !office.is_running()).await);
}

#[tokio::test]
async fn test_concurrent_creates_of_same_name() {
	let tmp = TempDir::new().unwrap();
	let registry = Arc::new(registry(tmp.path(), LONG_RUNNING, GRACE));

	let attempts = (0..8).map(|_| {
		let registry = registry.clone();
		tokio::spawn(async move {
			registry
				.create("office", "10.10.0.0/24".parse().unwrap())
				.await
		})
	});
	let results = futures::future::join_all(attempts).await;

	let created = results
		.iter()
		.filter(|r| matches!(r, Ok(Ok(_))))
		.count();
	let duplicates = results
		.iter()
		.filter(|r| matches!(r, Ok(Err(RegistryError::DuplicateName(_)))))
		.count();
	assert_eq!(created, 1);
	assert_eq!(duplicates, 7);
	assert_eq!(registry.list().await.len(), 1);
}

#[tokio::test]
async fn test_remove_running_network() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), LONG_RUNNING, GRACE);

	let office = registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let root = office.definition().root().to_path_buf();
	office.start().await;
	assert!(eventually(Duration::from_secs(2), || root.join("running").exists()).await);

	assert!(registry.remove("office").await.unwrap());
	assert!(!office.is_running());
	assert!(!root.exists());
	assert!(!registry.remove("office").await.unwrap());
}

#[tokio::test]
async fn test_remove_kills_network_that_ignores_sigterm() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), STUBBORN, Duration::from_millis(300));

	let office = registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let socket = office.definition().coordination_socket();
	office.start().await;
	assert!(eventually(Duration::from_secs(2), || socket.exists()).await);
	// Let the trap get installed.
	tokio::time::sleep(Duration::from_millis(200)).await;

	assert!(registry.remove("office").await.unwrap());
	assert!(!office.is_running());
	assert!(!office.definition().root().exists());
}

#[tokio::test]
async fn test_start_auto_and_shutdown() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), LONG_RUNNING, GRACE);

	let office = registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let lab = registry
		.create("lab", "10.20.0.0/24".parse().unwrap())
		.await
		.unwrap();
	office.definition().set_auto_start(true).await.unwrap();

	assert_eq!(registry.start_auto().await, vec!["office".to_string()]);
	assert!(eventually(Duration::from_secs(2), || office.is_running()).await);
	assert!(!lab.is_running());

	registry.shutdown().await.unwrap();
	assert!(!office.is_running());
}

#[tokio::test]
async fn test_shutdown_reports_forced_networks() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), STUBBORN, Duration::from_millis(300));

	let office = registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let socket = office.definition().coordination_socket();
	office.start().await;
	assert!(eventually(Duration::from_secs(2), || socket.exists()).await);
	tokio::time::sleep(Duration::from_millis(200)).await;

	let err = registry.shutdown().await.unwrap_err();
	assert!(matches!(err, RegistryError::ShutdownTimeout(names) if names == vec!["office".to_string()]));
	assert!(!office.is_running());
}

#[cfg(target_os = "linux")]
fn process_gone(pid: &str) -> bool {
	match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
		Err(_) => true,
		Ok(stat) => stat
			.rsplit(')')
			.next()
			.is_some_and(|state| state.trim_start().starts_with('Z')),
	}
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_forced_shutdown_kills_whole_process_group() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(tmp.path(), STUBBORN_WITH_CHILD, Duration::from_millis(300));

	let office = registry
		.create("office", "10.10.0.0/24".parse().unwrap())
		.await
		.unwrap();
	let marker = office.definition().root().join("grandchild");
	office.start().await;
	assert!(eventually(Duration::from_secs(2), || marker.exists()).await);
	tokio::time::sleep(Duration::from_millis(200)).await;
	let pid = std::fs::read_to_string(&marker).unwrap().trim().to_string();
	assert!(!process_gone(&pid));

	assert!(registry.shutdown().await.is_err());
	assert!(eventually(Duration::from_secs(2), || process_gone(&pid)).await);
}
