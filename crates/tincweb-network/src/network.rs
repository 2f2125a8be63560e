// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::config::{Config, Upgrade};
use crate::error::{NetworkError, Result};
use crate::node::{validate_name, Node};
use crate::scripts::{HookScripts, Platform};
use ipnet::IpNet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, instrument, warn};

const CONFIG_FILE: &str = "config.json";
const TINC_CONF: &str = "tinc.conf";
const HOSTS_DIR: &str = "hosts";
const PRIVATE_KEY: &str = "rsa_key.priv";
const PIDFILE: &str = "pid.run";
const LOGFILE: &str = "log.txt";
const COORDINATION_SOCKET: &str = "coordination.sock";

/// Handle to one network directory.
///
/// The handle holds no cached state: every accessor goes to disk, so several
/// handles to the same directory stay consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
	name: String,
	root: PathBuf,
}

impl Network {
	/// Opens an existing network directory.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		let name = dir_name(&root)?;
		if !root.join(CONFIG_FILE).is_file() {
			return Err(NetworkError::NotFound(root));
		}
		Ok(Self { name, root })
	}

	/// Creates a new network directory with a self node holding the first host
	/// address of `subnet`.
	#[instrument(skip(root), fields(root = %root.as_ref().display()))]
	pub async fn create(root: impl AsRef<Path>, self_name: &str, subnet: IpNet) -> Result<Self> {
		let root = root.as_ref().to_path_buf();
		let name = dir_name(&root)?;
		validate_name(self_name)?;

		if root.exists() {
			return Err(NetworkError::AlreadyExists(root));
		}

		let subnet = subnet.trunc();
		let self_ip = subnet
			.hosts()
			.next()
			.ok_or_else(|| NetworkError::InvalidSubnet(subnet.to_string()))?;

		tokio::fs::create_dir_all(root.join(HOSTS_DIR)).await?;

		let network = Self { name, root };
		let config = Config::new(self_name, subnet);
		network.write_config(&config).await?;
		network
			.put(&Node {
				name: self_name.to_string(),
				subnet: IpNet::from(self_ip),
				port: config.port,
				address: Vec::new(),
				public_key: String::new(),
				version: 0,
			})
			.await?;

		info!(network = %network.name, %subnet, %self_ip, "created network");
		Ok(network)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn pidfile(&self) -> PathBuf {
		self.root.join(PIDFILE)
	}

	pub fn logfile(&self) -> PathBuf {
		self.root.join(LOGFILE)
	}

	/// Unix socket the generated hook scripts report to.
	pub fn coordination_socket(&self) -> PathBuf {
		self.root.join(COORDINATION_SOCKET)
	}

	fn hosts_dir(&self) -> PathBuf {
		self.root.join(HOSTS_DIR)
	}

	fn host_file(&self, node: &str) -> PathBuf {
		self.hosts_dir().join(node)
	}

	pub async fn read(&self) -> Result<Config> {
		let content = tokio::fs::read_to_string(self.root.join(CONFIG_FILE)).await?;
		Ok(serde_json::from_str(&content)?)
	}

	async fn write_config(&self, config: &Config) -> Result<()> {
		let json = serde_json::to_string_pretty(config)?;
		write_atomic(&self.root.join(CONFIG_FILE), &json).await
	}

	/// Updates the persisted auto-start flag.
	pub async fn set_auto_start(&self, auto_start: bool) -> Result<()> {
		let mut config = self.read().await?;
		config.auto_start = auto_start;
		self.write_config(&config).await
	}

	/// Names of all nodes with a host file, sorted.
	pub async fn nodes(&self) -> Result<Vec<String>> {
		let mut names = Vec::new();
		let mut entries = tokio::fs::read_dir(self.hosts_dir()).await?;
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_file() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().to_string();
			if validate_name(&name).is_err() {
				debug!(network = %self.name, file = %name, "skipping non-host file");
				continue;
			}
			names.push(name);
		}
		names.sort();
		Ok(names)
	}

	pub async fn node(&self, name: &str) -> Result<Node> {
		validate_name(name)?;
		let path = self.host_file(name);
		let content = match tokio::fs::read_to_string(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(NetworkError::NodeNotFound(name.to_string()));
			}
			Err(e) => return Err(e.into()),
		};
		Node::parse_host_file(name, &content, &path)
	}

	pub async fn self_node(&self) -> Result<Node> {
		let config = self.read().await?;
		self.node(&config.name).await
	}

	/// Adds or replaces a host file.
	#[instrument(skip(self, node), fields(network = %self.name, node = %node.name))]
	pub async fn put(&self, node: &Node) -> Result<()> {
		validate_name(&node.name)?;
		write_atomic(&self.host_file(&node.name), &node.to_host_file()).await?;
		debug!("stored host file");
		Ok(())
	}

	/// Applies a partial update to the self node and bumps its version.
	#[instrument(skip(self, update), fields(network = %self.name))]
	pub async fn upgrade(&self, update: Upgrade) -> Result<Node> {
		let mut config = self.read().await?;
		let mut node = self.node(&config.name).await?;

		if update.is_empty() {
			return Ok(node);
		}
		if let Some(subnet) = update.subnet {
			node.subnet = subnet;
		}
		if let Some(port) = update.port {
			node.port = port;
			config.port = port;
		}
		if let Some(address) = update.address {
			node.address = address;
		}
		if let Some(device) = update.device {
			config.device = Some(device);
		}
		node.version += 1;

		self.write_config(&config).await?;
		self.put(&node).await?;
		info!(version = node.version, "upgraded self node");
		Ok(node)
	}

	/// Regenerates `tinc.conf`, the self host file and the hook scripts.
	///
	/// Safe to call before every start. Generates the RSA key pair through
	/// `tincd -K` when none exists yet.
	#[instrument(skip(self), fields(network = %self.name))]
	pub async fn configure(&self, tincd: &Path, executable: &Path) -> Result<()> {
		let config = self.read().await?;
		let mut self_node = self.self_node().await?;
		self_node.port = config.port;

		write_atomic(&self.root.join(TINC_CONF), &config.to_tinc_conf()).await?;
		self.put(&self_node).await?;

		if !self.root.join(PRIVATE_KEY).exists() {
			self.generate_keys(tincd).await?;
		}

		let scripts = HookScripts::render(
			Platform::current(),
			executable,
			&self_node,
			config.subnet,
			&self.coordination_socket(),
		);
		for (kind, content) in scripts.iter() {
			let path = self.root.join(kind.file_name());
			write_atomic(&path, content).await?;
			make_executable(&path).await?;
		}

		debug!("configuration regenerated");
		Ok(())
	}

	async fn generate_keys(&self, tincd: &Path) -> Result<()> {
		info!(network = %self.name, "generating key pair");
		let output = tokio::process::Command::new(tincd)
			.arg("-K")
			.arg("-c")
			.arg(&self.root)
			.current_dir(&self.root)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| NetworkError::KeyGeneration(format!("{}: {e}", tincd.display())))?;

		if !output.status.success() {
			return Err(NetworkError::KeyGeneration(format!(
				"{} exited with {}: {}",
				tincd.display(),
				output.status,
				String::from_utf8_lossy(&output.stderr).trim()
			)));
		}
		Ok(())
	}

	/// Deletes the whole network directory.
	#[instrument(skip(self), fields(network = %self.name))]
	pub async fn destroy(&self) -> Result<()> {
		match tokio::fs::remove_dir_all(&self.root).await {
			Ok(()) => {
				info!("removed network directory");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

fn dir_name(root: &Path) -> Result<String> {
	let name = root
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_default();
	validate_name(&name)?;
	Ok(name)
}

async fn write_atomic(path: &Path, content: &str) -> Result<()> {
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	tokio::fs::write(&tmp, content).await?;
	tokio::fs::rename(&tmp, path).await?;
	Ok(())
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
	use std::os::unix::fs::PermissionsExt;

	tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;

	// Keep generated files editable by the invoking user when running under sudo.
	if let (Ok(uid), Ok(gid)) = (std::env::var("SUDO_UID"), std::env::var("SUDO_GID")) {
		if let (Ok(uid), Ok(gid)) = (uid.parse(), gid.parse()) {
			if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
				warn!(path = %path.display(), error = %e, "failed to hand script to sudo user");
			}
		}
	}
	Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
	Ok(())
}
