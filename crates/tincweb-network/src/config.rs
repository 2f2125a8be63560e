// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::node::Address;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 655;

/// Persisted per-network settings, stored as `config.json` in the network root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// Name of this host inside the network.
	pub name: String,
	/// Address space shared by all nodes of the network.
	pub subnet: IpNet,
	pub port: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interface: Option<String>,
	#[serde(default)]
	pub auto_start: bool,
	#[serde(default = "default_mode")]
	pub mode: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device: Option<String>,
	#[serde(default)]
	pub connect_to: Vec<String>,
}

fn default_mode() -> String {
	"router".to_string()
}

impl Config {
	pub fn new(name: impl Into<String>, subnet: IpNet) -> Self {
		Self {
			name: name.into(),
			subnet,
			port: DEFAULT_PORT,
			interface: None,
			auto_start: false,
			mode: default_mode(),
			device_type: None,
			device: None,
			connect_to: Vec::new(),
		}
	}

	/// Renders `tinc.conf`.
	pub fn to_tinc_conf(&self) -> String {
		let mut out = format!("Name = {}\nPort = {}\nMode = {}\n", self.name, self.port, self.mode);
		if let Some(interface) = &self.interface {
			out.push_str(&format!("Interface = {interface}\n"));
		}
		if let Some(device_type) = &self.device_type {
			out.push_str(&format!("DeviceType = {device_type}\n"));
		}
		if let Some(device) = &self.device {
			out.push_str(&format!("Device = {device}\n"));
		}
		for peer in &self.connect_to {
			out.push_str(&format!("ConnectTo = {peer}\n"));
		}
		out
	}
}

/// Partial update of the self node and its network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subnet: Option<IpNet>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<Vec<Address>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device: Option<String>,
}

impl Upgrade {
	pub fn is_empty(&self) -> bool {
		self.subnet.is_none() && self.port.is_none() && self.address.is_none() && self.device.is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_tinc_conf_minimal() {
		let config = Config::new("home", "10.10.0.0/24".parse().unwrap());
		assert_eq!(config.to_tinc_conf(), "Name = home\nPort = 655\nMode = router\n");
	}

	#[test]
	fn test_tinc_conf_with_optional_fields() {
		let mut config = Config::new("home", "10.10.0.0/24".parse().unwrap());
		config.interface = Some("tun7".to_string());
		config.device_type = Some("tap".to_string());
		config.connect_to = vec!["alice".to_string(), "bob".to_string()];
		let conf = config.to_tinc_conf();
		assert!(conf.contains("Interface = tun7\n"));
		assert!(conf.contains("DeviceType = tap\n"));
		assert!(conf.contains("ConnectTo = alice\nConnectTo = bob\n"));
		assert!(!conf.contains("Device ="));
	}

	#[test]
	fn test_config_deserialize_defaults() {
		let config: Config =
			serde_json::from_str(r#"{"name":"home","subnet":"10.0.0.0/16","port":700}"#).unwrap();
		assert_eq!(config.mode, "router");
		assert!(!config.auto_start);
		assert!(config.connect_to.is_empty());
	}

	#[test]
	fn test_upgrade_is_empty() {
		assert!(Upgrade::default().is_empty());
		let upgrade = Upgrade {
			port: Some(1000),
			..Default::default()
		};
		assert!(!upgrade.is_empty());
	}
}
