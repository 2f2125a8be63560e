// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Unix socket endpoint that hook scripts report peer events to.

use crate::error::ProtocolError;
use crate::protocol::{codec, PeerEvent, Reply, IO_TIMEOUT};
use crate::tracker::Envelope;
use futures::{SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long a hook connection may take to deliver its line.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound coordination socket of one run.
///
/// Every connection is read on its own task, so a client that never writes
/// cannot hold up other hooks. tincd runs its scripts one after another, which
/// keeps mailbox order equal to the order tincd produced the events.
#[derive(Debug)]
pub struct CoordinationServer {
	listener: UnixListener,
	path: PathBuf,
}

impl CoordinationServer {
	/// Binds `path`, replacing a stale socket left by a previous run.
	pub fn bind(path: &Path) -> std::io::Result<Self> {
		match std::fs::remove_file(path) {
			Ok(()) => debug!(path = %path.display(), "removed stale coordination socket"),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e),
		}

		let listener = UnixListener::bind(path)?;
		restrict_permissions(path)?;
		Ok(Self {
			listener,
			path: path.to_path_buf(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Forwards decoded events to `mailbox` until `cancel` fires, then answers
	/// `rejected` until `close` fires. tincd still runs `subnet-down` and
	/// `tinc-down` while it shuts down, so `close` should follow its exit.
	#[instrument(skip_all, fields(socket = %self.path.display()))]
	pub async fn serve(
		self,
		mailbox: mpsc::Sender<Envelope>,
		cancel: CancellationToken,
		close: CancellationToken,
	) {
		info!("coordination server listening");
		let mut connections = JoinSet::new();
		loop {
			tokio::select! {
				_ = close.cancelled() => break,
				Some(joined) = connections.join_next(), if !connections.is_empty() => {
					match joined {
						Ok(Err(e)) => debug!(error = %e, "hook connection ended with error"),
						Err(e) if e.is_panic() => warn!(error = %e, "hook connection panicked"),
						_ => {}
					}
				}
				accepted = self.listener.accept() => match accepted {
					Ok((stream, _)) => {
						connections.spawn(handle_connection(stream, mailbox.clone(), cancel.clone()));
					}
					Err(e) => warn!(error = %e, "failed to accept hook connection"),
				},
			}
		}
		connections.shutdown().await;

		if let Err(e) = std::fs::remove_file(&self.path) {
			if e.kind() != std::io::ErrorKind::NotFound {
				warn!(error = %e, "failed to remove coordination socket");
			}
		}
		info!("coordination server stopped");
	}
}

async fn handle_connection(
	stream: UnixStream,
	mailbox: mpsc::Sender<Envelope>,
	cancel: CancellationToken,
) -> Result<(), ProtocolError> {
	let mut framed = Framed::new(stream, codec());

	let line = tokio::time::timeout(READ_TIMEOUT, framed.next())
		.await
		.map_err(|_| ProtocolError::Timeout)?
		.ok_or(ProtocolError::ConnectionClosed)?;

	let reply = match line.map_err(ProtocolError::from).and_then(|l| PeerEvent::decode(&l)) {
		Ok(event) => dispatch(event, &mailbox, &cancel).await,
		Err(e) => {
			warn!(error = %e, "malformed hook message");
			Reply::Malformed {
				reason: e.to_string(),
			}
		}
	};

	let line = serde_json::to_string(&reply)?;
	tokio::time::timeout(IO_TIMEOUT, framed.send(line))
		.await
		.map_err(|_| ProtocolError::Timeout)??;
	Ok(())
}

async fn dispatch(
	event: PeerEvent,
	mailbox: &mpsc::Sender<Envelope>,
	cancel: &CancellationToken,
) -> Reply {
	if cancel.is_cancelled() {
		return Reply::rejected("network is stopping");
	}

	debug!(kind = event.kind(), node = event.node(), "received peer event");
	let (reply_tx, reply_rx) = oneshot::channel();
	let envelope = Envelope {
		event,
		reply: reply_tx,
	};

	let sent = tokio::select! {
		_ = cancel.cancelled() => false,
		sent = mailbox.send(envelope) => sent.is_ok(),
	};
	if !sent {
		return Reply::rejected("network is stopping");
	}

	reply_rx
		.await
		.unwrap_or_else(|_| Reply::rejected("network is stopping"))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
	Ok(())
}
