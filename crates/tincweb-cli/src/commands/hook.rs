// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tincweb_daemon::{PeerEvent, ProtocolError, Reply};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookEvent {
	InterfaceUp,
	InterfaceDown,
	SubnetUp,
	SubnetDown,
}

/// Arguments of a hook invocation. Everything but the socket and the event
/// kind comes from the environment tincd sets for its scripts.
#[derive(Debug, Clone, Args)]
pub struct HookArgs {
	/// Coordination socket of the network
	#[arg(long)]
	pub socket: PathBuf,

	pub event: HookEvent,

	/// Node the event is about
	#[arg(long, env = "NODE")]
	pub node: Option<String>,

	/// Name of this node
	#[arg(long, env = "NAME")]
	pub name: Option<String>,

	#[arg(long, env = "SUBNET")]
	pub subnet: Option<String>,

	#[arg(long, env = "INTERFACE")]
	pub interface: Option<String>,
}

impl HookArgs {
	pub fn to_event(&self) -> anyhow::Result<PeerEvent> {
		let event = match self.event {
			HookEvent::InterfaceUp | HookEvent::InterfaceDown => {
				let node = self
					.name
					.clone()
					.or_else(|| self.node.clone())
					.context("NAME is not set")?;
				let interface = self.interface.clone();
				if self.event == HookEvent::InterfaceUp {
					PeerEvent::InterfaceUp { node, interface }
				} else {
					PeerEvent::InterfaceDown { node, interface }
				}
			}
			HookEvent::SubnetUp | HookEvent::SubnetDown => {
				let node = self.node.clone().context("NODE is not set")?;
				let subnet = self.subnet.clone().context("SUBNET is not set")?;
				if self.event == HookEvent::SubnetUp {
					PeerEvent::SubnetUp { node, subnet }
				} else {
					PeerEvent::SubnetDown { node, subnet }
				}
			}
		};
		Ok(event)
	}
}

/// Sends the event and maps the verdict to an exit status. A rejection is not
/// a failure: the OS change already happened. Neither is a socket that is
/// gone, which is what tincd's down scripts see once the daemon let go of it.
#[instrument(skip_all, fields(event = ?args.event))]
pub async fn handle_hook(args: HookArgs) -> anyhow::Result<()> {
	let event = args.to_event()?;

	#[cfg(unix)]
	{
		match tincweb_daemon::send_event(&args.socket, &event).await {
			Ok(reply) => check_reply(reply),
			Err(ProtocolError::Io(e)) if daemon_gone(&e) => {
				warn!(socket = %args.socket.display(), error = %e, "no daemon listening, event dropped");
				Ok(())
			}
			Err(e) => Err(anyhow::Error::new(e)
				.context(format!("report {} to {}", event.kind(), args.socket.display()))),
		}
	}

	#[cfg(not(unix))]
	{
		let _ = event;
		bail!("hook callbacks need Unix domain sockets")
	}
}

#[cfg(unix)]
fn daemon_gone(e: &std::io::Error) -> bool {
	matches!(
		e.kind(),
		std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
	)
}

fn check_reply(reply: Reply) -> anyhow::Result<()> {
	match reply {
		Reply::Accepted => {
			debug!("event accepted");
			Ok(())
		}
		Reply::Rejected { reason } => {
			warn!(%reason, "event rejected by daemon");
			Ok(())
		}
		Reply::Malformed { reason } => bail!("daemon could not decode event: {reason}"),
	}
}
