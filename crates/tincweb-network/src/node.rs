// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{NetworkError, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const PEM_BEGIN: &str = "-----BEGIN";

/// Checks a network or node name against tinc's rules.
///
/// Names end up as directory and host file names and as `Name =` values in
/// `tinc.conf`, so only `[A-Za-z0-9_]` is allowed.
pub fn validate_name(name: &str) -> Result<()> {
	if name.is_empty()
		|| !name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_')
	{
		return Err(NetworkError::InvalidName(name.to_string()));
	}
	Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
	pub host: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.port {
			Some(port) => write!(f, "{} {}", self.host, port),
			None => write!(f, "{}", self.host),
		}
	}
}

/// A participant of a network, as stored in `hosts/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub name: String,
	pub subnet: IpNet,
	pub port: u16,
	#[serde(default)]
	pub address: Vec<Address>,
	#[serde(default)]
	pub public_key: String,
	#[serde(default)]
	pub version: u64,
}

impl Node {
	/// Renders the node in tinc host file syntax.
	pub fn to_host_file(&self) -> String {
		let mut out = String::new();
		out.push_str(&format!("Subnet = {}\n", self.subnet));
		for address in &self.address {
			out.push_str(&format!("Address = {address}\n"));
		}
		out.push_str(&format!("Port = {}\n", self.port));
		out.push_str(&format!("Version = {}\n", self.version));
		if !self.public_key.is_empty() {
			out.push('\n');
			out.push_str(self.public_key.trim_end());
			out.push('\n');
		}
		out
	}

	/// Parses a tinc host file. Unknown keys are ignored; everything from the
	/// first PEM marker onwards is kept verbatim as the public key.
	pub fn parse_host_file(name: &str, content: &str, path: &Path) -> Result<Self> {
		let malformed = |message: String| NetworkError::HostFile {
			path: path.to_path_buf(),
			message,
		};

		let (header, public_key) = match content.find(PEM_BEGIN) {
			Some(idx) => (&content[..idx], content[idx..].trim_end().to_string()),
			None => (content, String::new()),
		};

		let mut subnet = None;
		let mut port = None;
		let mut version = 0;
		let mut address = Vec::new();

		for line in header.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			let Some((key, value)) = line.split_once('=') else {
				return Err(malformed(format!("expected 'Key = Value', got '{line}'")));
			};
			let value = value.trim();
			match key.trim().to_ascii_lowercase().as_str() {
				"subnet" => {
					let parsed = value
						.parse::<IpNet>()
						.or_else(|_| value.parse::<std::net::IpAddr>().map(IpNet::from))
						.map_err(|_| malformed(format!("invalid subnet '{value}'")))?;
					subnet = Some(parsed);
				}
				"port" => {
					port = Some(
						value
							.parse()
							.map_err(|_| malformed(format!("invalid port '{value}'")))?,
					);
				}
				"version" => {
					version = value
						.parse()
						.map_err(|_| malformed(format!("invalid version '{value}'")))?;
				}
				"address" => {
					let mut parts = value.split_whitespace();
					let host = parts.next().unwrap_or_default().to_string();
					let port = match parts.next() {
						Some(p) => Some(
							p.parse()
								.map_err(|_| malformed(format!("invalid address port '{p}'")))?,
						),
						None => None,
					};
					address.push(Address { host, port });
				}
				_ => {}
			}
		}

		Ok(Node {
			name: name.to_string(),
			subnet: subnet.ok_or_else(|| malformed("missing Subnet".to_string()))?,
			port: port.unwrap_or(crate::config::DEFAULT_PORT),
			address,
			public_key,
			version,
		})
	}
}
