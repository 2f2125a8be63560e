// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hook callback protocol.
//!
//! A hook script connects to the run's coordination socket, writes one JSON
//! line holding a [`PeerEvent`] and reads back one JSON line holding a
//! [`Reply`]. One event per connection.

use crate::error::ProtocolError;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, instrument};

/// Longest accepted line in either direction.
pub const MAX_LINE_LENGTH: usize = 4096;

/// How long either side waits for the other's line.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerEvent {
	InterfaceUp {
		node: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		interface: Option<String>,
	},
	InterfaceDown {
		node: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		interface: Option<String>,
	},
	SubnetUp {
		node: String,
		subnet: String,
	},
	SubnetDown {
		node: String,
		subnet: String,
	},
}

impl PeerEvent {
	pub fn node(&self) -> &str {
		match self {
			PeerEvent::InterfaceUp { node, .. }
			| PeerEvent::InterfaceDown { node, .. }
			| PeerEvent::SubnetUp { node, .. }
			| PeerEvent::SubnetDown { node, .. } => node,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			PeerEvent::InterfaceUp { .. } => "interface_up",
			PeerEvent::InterfaceDown { .. } => "interface_down",
			PeerEvent::SubnetUp { .. } => "subnet_up",
			PeerEvent::SubnetDown { .. } => "subnet_down",
		}
	}

	pub fn decode(line: &str) -> Result<Self, ProtocolError> {
		let event: PeerEvent = serde_json::from_str(line)?;
		if event.node().is_empty() {
			return Err(ProtocolError::Decode(serde::de::Error::custom(
				"node name must not be empty",
			)));
		}
		Ok(event)
	}
}

/// Verdict returned to the hook script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
	Accepted,
	Rejected { reason: String },
	Malformed { reason: String },
}

impl Reply {
	pub fn rejected(reason: impl Into<String>) -> Self {
		Reply::Rejected {
			reason: reason.into(),
		}
	}
}

pub(crate) fn codec() -> LinesCodec {
	LinesCodec::new_with_max_length(MAX_LINE_LENGTH)
}

/// Delivers one event to a coordination socket and returns the daemon's verdict.
#[cfg(unix)]
#[instrument(skip(event), fields(socket = %socket.display(), kind = event.kind(), node = event.node()))]
pub async fn send_event(socket: &Path, event: &PeerEvent) -> Result<Reply, ProtocolError> {
	let stream = tokio::net::UnixStream::connect(socket).await?;
	let mut framed = Framed::new(stream, codec());

	let line = serde_json::to_string(event)?;
	tokio::time::timeout(IO_TIMEOUT, framed.send(line))
		.await
		.map_err(|_| ProtocolError::Timeout)??;

	let reply = tokio::time::timeout(IO_TIMEOUT, framed.next())
		.await
		.map_err(|_| ProtocolError::Timeout)?
		.ok_or(ProtocolError::ConnectionClosed)??;

	let reply: Reply = serde_json::from_str(&reply)?;
	debug!(?reply, "coordination server replied");
	Ok(reply)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_decode_subnet_up() {
		let event =
			PeerEvent::decode(r#"{"type":"subnet_up","node":"alice","subnet":"10.10.0.2"}"#).unwrap();
		assert_eq!(
			event,
			PeerEvent::SubnetUp {
				node: "alice".to_string(),
				subnet: "10.10.0.2".to_string(),
			}
		);
		assert_eq!(event.kind(), "subnet_up");
	}

	#[test]
	fn test_decode_interface_up_without_interface() {
		let event = PeerEvent::decode(r#"{"type":"interface_up","node":"home"}"#).unwrap();
		assert_eq!(event.node(), "home");
	}

	#[test]
	fn test_decode_rejects_unknown_type() {
		let result = PeerEvent::decode(r#"{"type":"reboot","node":"alice"}"#);
		assert!(matches!(result, Err(ProtocolError::Decode(_))));
	}

	#[test]
	fn test_decode_rejects_missing_subnet() {
		let result = PeerEvent::decode(r#"{"type":"subnet_down","node":"alice"}"#);
		assert!(matches!(result, Err(ProtocolError::Decode(_))));
	}

	#[test]
	fn test_decode_rejects_empty_node() {
		let result = PeerEvent::decode(r#"{"type":"subnet_up","node":"","subnet":"10.0.0.1"}"#);
		assert!(matches!(result, Err(ProtocolError::Decode(_))));
	}

	#[test]
	fn test_reply_wire_format() {
		assert_eq!(
			serde_json::to_string(&Reply::Accepted).unwrap(),
			r#"{"status":"accepted"}"#
		);
		assert_eq!(
			serde_json::to_string(&Reply::rejected("stopping")).unwrap(),
			r#"{"status":"rejected","reason":"stopping"}"#
		);
	}
}
