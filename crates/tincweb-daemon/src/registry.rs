// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{RegistryError, Result};
use crate::supervisor::{NetworkSupervisor, SupervisorSettings};
use ipnet::IpNet;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tincweb_config::DaemonConfig;
use tincweb_network::{Network, NetworkError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
	/// Directory holding one subdirectory per network.
	pub networks_dir: PathBuf,
	pub tincd: PathBuf,
	/// Binary the hook scripts call back into.
	pub executable: PathBuf,
	/// Self node name for newly created networks.
	pub self_name: String,
	pub graceful_shutdown: Duration,
}

impl RegistryOptions {
	pub fn from_config(config: &DaemonConfig, executable: PathBuf) -> Self {
		Self {
			networks_dir: config.networks_dir.clone(),
			tincd: config.tincd.clone(),
			executable,
			self_name: config.self_name.clone(),
			graceful_shutdown: config.graceful_shutdown(),
		}
	}

	fn settings(&self) -> SupervisorSettings {
		SupervisorSettings {
			tincd: self.tincd.clone(),
			executable: self.executable.clone(),
		}
	}
}

/// Every supervisor hosted by one daemon, keyed by network name.
#[derive(Debug)]
pub struct SupervisorRegistry {
	options: RegistryOptions,
	root: CancellationToken,
	supervisors: Mutex<HashMap<String, Arc<NetworkSupervisor>>>,
}

impl SupervisorRegistry {
	pub fn new(options: RegistryOptions, root: CancellationToken) -> Self {
		Self {
			options,
			root,
			supervisors: Mutex::new(HashMap::new()),
		}
	}

	pub fn options(&self) -> &RegistryOptions {
		&self.options
	}

	/// Registers every network found under the networks directory. Returns the
	/// number of networks added.
	#[instrument(skip(self), fields(dir = %self.options.networks_dir.display()))]
	pub async fn load(&self) -> Result<usize> {
		tokio::fs::create_dir_all(&self.options.networks_dir).await?;
		let mut entries = tokio::fs::read_dir(&self.options.networks_dir).await?;

		let mut supervisors = self.supervisors.lock().await;
		let mut loaded = 0;
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_dir() {
				continue;
			}
			let network = match Network::open(entry.path()) {
				Ok(network) => network,
				Err(e) => {
					warn!(path = %entry.path().display(), error = %e, "skipping network directory");
					continue;
				}
			};
			if supervisors.contains_key(network.name()) {
				continue;
			}
			let name = network.name().to_string();
			let supervisor = self.supervisor_for(network).await;
			supervisors.insert(name, Arc::new(supervisor));
			loaded += 1;
		}

		info!(loaded, total = supervisors.len(), "networks loaded");
		Ok(loaded)
	}

	/// Persists a new network definition and registers a not-started
	/// supervisor for it.
	#[instrument(skip(self), fields(network = %name, %subnet))]
	pub async fn create(&self, name: &str, subnet: IpNet) -> Result<Arc<NetworkSupervisor>> {
		let mut supervisors = self.supervisors.lock().await;
		if supervisors.contains_key(name) {
			return Err(RegistryError::DuplicateName(name.to_string()));
		}

		let root = self.options.networks_dir.join(name);
		let network = match Network::create(&root, &self.options.self_name, subnet).await {
			Ok(network) => network,
			Err(NetworkError::AlreadyExists(_)) => {
				return Err(RegistryError::DuplicateName(name.to_string()));
			}
			Err(e) => return Err(e.into()),
		};

		let supervisor = Arc::new(self.supervisor_for(network).await);
		supervisors.insert(name.to_string(), supervisor.clone());
		info!("network registered");
		Ok(supervisor)
	}

	pub async fn get(&self, name: &str) -> Result<Arc<NetworkSupervisor>> {
		self
			.supervisors
			.lock()
			.await
			.get(name)
			.cloned()
			.ok_or_else(|| RegistryError::NotFound(name.to_string()))
	}

	/// Stops, deletes and unregisters a network. Returns whether it existed.
	///
	/// A network that ignores the grace period is killed and still removed.
	/// When its directory cannot be deleted it stays registered, stopped.
	#[instrument(skip(self))]
	pub async fn remove(&self, name: &str) -> Result<bool> {
		let supervisor = self.supervisors.lock().await.remove(name);
		let Some(supervisor) = supervisor else {
			return Ok(false);
		};

		if !supervisor.stop_within(self.options.graceful_shutdown).await {
			warn!(network = %name, "network was killed during removal");
		}
		if let Err(e) = supervisor.definition().destroy().await {
			error!(network = %name, error = %e, "failed to delete network, keeping it registered");
			self.supervisors
				.lock()
				.await
				.entry(name.to_string())
				.or_insert(supervisor);
			return Err(e.into());
		}
		info!(network = %name, "network removed");
		Ok(true)
	}

	pub async fn list(&self) -> Vec<Arc<NetworkSupervisor>> {
		self.supervisors.lock().await.values().cloned().collect()
	}

	/// Starts every registered network whose config asks for it. Returns the
	/// names started.
	pub async fn start_auto(&self) -> Vec<String> {
		let mut started = Vec::new();
		for supervisor in self.list().await {
			let network = supervisor.definition();
			match network.read().await {
				Ok(config) if config.auto_start => {
					supervisor.start().await;
					started.push(network.name().to_string());
				}
				Ok(_) => {}
				Err(e) => warn!(network = %network.name(), error = %e, "failed to read network config"),
			}
		}
		info!(count = started.len(), "auto-started networks");
		started
	}

	/// Cancels every run and waits up to the grace period for each network.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) -> Result<()> {
		self.root.cancel();

		let supervisors = self.list().await;
		let grace = self.options.graceful_shutdown;
		let results = futures::future::join_all(supervisors.iter().map(|supervisor| async move {
			let graceful = supervisor.stop_within(grace).await;
			(supervisor.definition().name().to_string(), graceful)
		}))
		.await;

		let mut forced: Vec<String> = results
			.into_iter()
			.filter(|(_, graceful)| !graceful)
			.map(|(name, _)| name)
			.collect();
		if forced.is_empty() {
			info!("all networks stopped");
			Ok(())
		} else {
			forced.sort();
			Err(RegistryError::ShutdownTimeout(forced))
		}
	}

	async fn supervisor_for(&self, network: Network) -> NetworkSupervisor {
		NetworkSupervisor::new(network, self.options.settings(), self.root.child_token()).await
	}
}
