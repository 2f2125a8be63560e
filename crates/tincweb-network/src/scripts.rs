// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hook script templates.
//!
//! tincd runs `tinc-up`/`tinc-down` when the virtual interface changes state and
//! `subnet-up`/`subnet-down` whenever a subnet becomes (un)reachable. Every
//! script first performs the OS action and then reports the transition to the
//! daemon through `<exe> hook --socket <path> <event>`.

use crate::node::Node;
use ipnet::IpNet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	Linux,
	Darwin,
}

impl Platform {
	pub fn current() -> Self {
		if cfg!(target_os = "macos") {
			Platform::Darwin
		} else {
			Platform::Linux
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
	TincUp,
	TincDown,
	SubnetUp,
	SubnetDown,
}

impl HookKind {
	pub const ALL: [HookKind; 4] = [
		HookKind::TincUp,
		HookKind::TincDown,
		HookKind::SubnetUp,
		HookKind::SubnetDown,
	];

	/// File name tincd looks for in the network root.
	pub fn file_name(self) -> &'static str {
		match self {
			HookKind::TincUp => "tinc-up",
			HookKind::TincDown => "tinc-down",
			HookKind::SubnetUp => "subnet-up",
			HookKind::SubnetDown => "subnet-down",
		}
	}

	/// Event argument passed to the `hook` subcommand.
	pub fn event_arg(self) -> &'static str {
		match self {
			HookKind::TincUp => "interface-up",
			HookKind::TincDown => "interface-down",
			HookKind::SubnetUp => "subnet-up",
			HookKind::SubnetDown => "subnet-down",
		}
	}
}

/// Rendered scripts for one network.
#[derive(Debug, Clone)]
pub struct HookScripts {
	scripts: Vec<(HookKind, String)>,
}

impl HookScripts {
	pub fn render(
		platform: Platform,
		executable: &Path,
		self_node: &Node,
		network: IpNet,
		socket: &Path,
	) -> Self {
		let callback = |kind: HookKind| {
			format!(
				"{} hook --socket {} {}\n",
				shell_quote(&executable.to_string_lossy()),
				shell_quote(&socket.to_string_lossy()),
				kind.event_arg()
			)
		};

		let scripts = HookKind::ALL
			.iter()
			.map(|&kind| {
				let action = match platform {
					Platform::Linux => linux_action(kind, self_node, network),
					Platform::Darwin => darwin_action(kind, self_node),
				};
				(kind, format!("#!/bin/sh\n{action}{}", callback(kind)))
			})
			.collect();

		Self { scripts }
	}

	pub fn get(&self, kind: HookKind) -> Option<&str> {
		self
			.scripts
			.iter()
			.find(|(k, _)| *k == kind)
			.map(|(_, s)| s.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = (HookKind, &str)> {
		self.scripts.iter().map(|(k, s)| (*k, s.as_str()))
	}
}

// The interface carries the whole network prefix, so the kernel routes every
// peer subnet through it without per-host routes.
fn linux_action(kind: HookKind, self_node: &Node, network: IpNet) -> String {
	match kind {
		HookKind::TincUp => format!(
			"ip link set dev \"$INTERFACE\" up\nip addr add {}/{} dev \"$INTERFACE\"\n",
			self_node.subnet.addr(),
			network.prefix_len()
		),
		HookKind::TincDown => "ip link set dev \"$INTERFACE\" down\n".to_string(),
		HookKind::SubnetUp | HookKind::SubnetDown => String::new(),
	}
}

fn darwin_action(kind: HookKind, self_node: &Node) -> String {
	match kind {
		HookKind::TincUp => format!(
			"ifconfig \"$INTERFACE\" {} netmask 255.255.255.255\n",
			self_node.subnet.addr()
		),
		HookKind::TincDown => "ifconfig \"$INTERFACE\" down\n".to_string(),
		HookKind::SubnetUp => {
			"[ \"$NODE\" = \"$NAME\" ] || route add -host \"$SUBNET\" -iface \"$INTERFACE\"\n".to_string()
		}
		HookKind::SubnetDown => {
			"[ \"$NODE\" = \"$NAME\" ] || route delete -host \"$SUBNET\" -iface \"$INTERFACE\"\n"
				.to_string()
		}
	}
}

fn shell_quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn self_node() -> Node {
		Node {
			name: "home".to_string(),
			subnet: "10.10.0.1/32".parse().unwrap(),
			port: 655,
			address: Vec::new(),
			public_key: String::new(),
			version: 0,
		}
	}

	fn render(platform: Platform) -> HookScripts {
		HookScripts::render(
			platform,
			Path::new("/usr/bin/tinc-web-boot"),
			&self_node(),
			"10.10.0.0/24".parse().unwrap(),
			Path::new("/var/lib/tinc/office/coordination.sock"),
		)
	}

	#[test]
	fn test_every_script_calls_back() {
		for platform in [Platform::Linux, Platform::Darwin] {
			let scripts = render(platform);
			for kind in HookKind::ALL {
				let script = scripts.get(kind).unwrap();
				assert!(script.starts_with("#!/bin/sh\n"));
				assert!(script.contains(&format!(
					"'/usr/bin/tinc-web-boot' hook --socket '/var/lib/tinc/office/coordination.sock' {}",
					kind.event_arg()
				)));
			}
		}
	}

	#[test]
	fn test_linux_tinc_up_uses_network_prefix() {
		let scripts = render(Platform::Linux);
		let up = scripts.get(HookKind::TincUp).unwrap();
		assert!(up.contains("ip addr add 10.10.0.1/24 dev \"$INTERFACE\""));
	}

	#[test]
	fn test_darwin_subnet_scripts_manage_host_routes() {
		let scripts = render(Platform::Darwin);
		assert!(scripts
			.get(HookKind::SubnetUp)
			.unwrap()
			.contains("route add -host \"$SUBNET\""));
		assert!(scripts
			.get(HookKind::SubnetDown)
			.unwrap()
			.contains("route delete -host \"$SUBNET\""));
	}

	#[test]
	fn test_shell_quote_escapes_single_quotes() {
		assert_eq!(shell_quote("/opt/it's/bin"), r"'/opt/it'\''s/bin'");
	}
}
