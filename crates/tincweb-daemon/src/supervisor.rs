// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lifecycle of one network: the `tincd` process, its coordination server and
//! its peer tracker, all living under one cancellation scope.

use crate::coordination::CoordinationServer;
use crate::error::RunError;
use crate::tracker::{PeerStatus, PeerTracker};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tincweb_network::Network;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Paths every run needs besides the definition.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
	/// `tincd` binary, resolved through `PATH` when relative.
	pub tincd: PathBuf,
	/// Binary the hook scripts call back into.
	pub executable: PathBuf,
}

/// How long a run gets to wind down after its process group was killed.
const KILL_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct ActiveRun {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
	/// Process group of the live `tincd`, 0 when none is running.
	pgid: Arc<AtomicU32>,
}

impl ActiveRun {
	/// Cancels the run and joins it. With a grace period the whole process
	/// group is killed once it expires; returns false in that case.
	async fn finish(mut self, grace: Option<Duration>) -> bool {
		self.cancel.cancel();
		let joined = match grace {
			None => (&mut self.handle).await,
			Some(grace) => match tokio::time::timeout(grace, &mut self.handle).await {
				Ok(joined) => joined,
				Err(_) => {
					self.kill_group();
					if tokio::time::timeout(KILL_WAIT, &mut self.handle).await.is_err() {
						self.handle.abort();
						let _ = self.handle.await;
					}
					return false;
				}
			},
		};
		if let Err(e) = joined {
			if e.is_panic() {
				error!(error = %e, "network run panicked");
			}
		}
		true
	}

	#[cfg(unix)]
	fn kill_group(&self) {
		let pgid = self.pgid.swap(0, Ordering::SeqCst);
		if pgid != 0 {
			signal_group(pgid, libc::SIGKILL);
		}
	}

	#[cfg(not(unix))]
	fn kill_group(&self) {}
}

/// Sets the run's completion signal however the run task ends, aborts included.
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
	fn drop(&mut self) {
		self.0.send_replace(true);
	}
}

pub struct NetworkSupervisor {
	definition: Network,
	settings: Arc<SupervisorSettings>,
	root: CancellationToken,
	control: Mutex<Option<ActiveRun>>,
	done: RwLock<Option<watch::Receiver<bool>>>,
	tracker: RwLock<Arc<PeerTracker>>,
	last_error: Arc<RwLock<Option<Arc<RunError>>>>,
}

impl std::fmt::Debug for NetworkSupervisor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NetworkSupervisor")
			.field("network", &self.definition.name())
			.field("running", &self.is_running())
			.finish_non_exhaustive()
	}
}

impl NetworkSupervisor {
	/// Builds a not-started supervisor. Every run gets a child of `root`.
	pub async fn new(
		definition: Network,
		settings: SupervisorSettings,
		root: CancellationToken,
	) -> Self {
		let tracker = Arc::new(PeerTracker::new(known_nodes(&definition).await));
		Self {
			definition,
			settings: Arc::new(settings),
			root,
			control: Mutex::new(None),
			done: RwLock::new(None),
			tracker: RwLock::new(tracker),
			last_error: Arc::new(RwLock::new(None)),
		}
	}

	pub fn definition(&self) -> &Network {
		&self.definition
	}

	/// Tears down any previous run, then launches a new one in the background.
	#[instrument(skip(self), fields(network = %self.definition.name()))]
	pub async fn start(&self) {
		let mut control = self.control.lock().await;
		if let Some(previous) = control.take() {
			debug!("stopping previous run");
			previous.finish(None).await;
		}

		let tracker = Arc::new(PeerTracker::new(known_nodes(&self.definition).await));
		*self.tracker.write() = tracker.clone();
		*self.last_error.write() = None;

		let cancel = self.root.child_token();
		let (done_tx, done_rx) = watch::channel(false);
		*self.done.write() = Some(done_rx);
		let pgid = Arc::new(AtomicU32::new(0));

		let handle = tokio::spawn({
			let definition = self.definition.clone();
			let settings = self.settings.clone();
			let last_error = self.last_error.clone();
			let cancel = cancel.clone();
			let pgid = pgid.clone();
			async move {
				let _done = DoneGuard(done_tx);
				let name = definition.name().to_string();
				match run(definition, settings, tracker, pgid, cancel).await {
					Ok(()) => info!(network = %name, "network run finished"),
					Err(e) => {
						error!(network = %name, error = %e, "network run failed");
						*last_error.write() = Some(Arc::new(e));
					}
				}
			}
		});

		*control = Some(ActiveRun {
			cancel,
			handle,
			pgid,
		});
		info!("network started");
	}

	/// Cancels the active run and waits for all of its tasks. No-op when idle.
	#[instrument(skip(self), fields(network = %self.definition.name()))]
	pub async fn stop(&self) {
		let mut control = self.control.lock().await;
		if let Some(active) = control.take() {
			active.finish(None).await;
			info!("network stopped");
		}
	}

	/// Like [`stop`](Self::stop) but kills the `tincd` process group once
	/// `grace` expires. Returns false when the run had to be aborted.
	#[instrument(skip(self), fields(network = %self.definition.name()))]
	pub async fn stop_within(&self, grace: Duration) -> bool {
		let mut control = self.control.lock().await;
		match control.take() {
			Some(active) => {
				let graceful = active.finish(Some(grace)).await;
				if graceful {
					info!("network stopped");
				} else {
					warn!(grace_secs = grace.as_secs(), "network did not stop in time, killed");
				}
				graceful
			}
			None => true,
		}
	}

	pub fn is_running(&self) -> bool {
		self.done.read().as_ref().is_some_and(|done| !*done.borrow())
	}

	/// Peer snapshot. Every peer reads offline while the network is not running.
	pub fn peers(&self) -> Vec<PeerStatus> {
		let mut peers = self.tracker.read().list();
		if !self.is_running() {
			for peer in &mut peers {
				peer.online = false;
			}
		}
		peers
	}

	pub fn peer(&self, name: &str) -> Option<PeerStatus> {
		let running = self.is_running();
		self.tracker.read().get(name).map(|mut peer| {
			peer.online &= running;
			peer
		})
	}

	/// Terminal error of the most recent run, cleared by the next start.
	pub fn last_error(&self) -> Option<Arc<RunError>> {
		self.last_error.read().clone()
	}
}

async fn known_nodes(definition: &Network) -> Vec<String> {
	match definition.nodes().await {
		Ok(nodes) => nodes,
		Err(e) => {
			warn!(network = %definition.name(), error = %e, "failed to list nodes");
			Vec::new()
		}
	}
}

async fn run(
	definition: Network,
	settings: Arc<SupervisorSettings>,
	tracker: Arc<PeerTracker>,
	pgid: Arc<AtomicU32>,
	cancel: CancellationToken,
) -> Result<(), RunError> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => return Ok(()),
		configured = definition.configure(&settings.tincd, &settings.executable) => {
			configured.map_err(RunError::Configuration)?;
		}
	}

	let abort = cancel.child_token();

	// Bound before tincd starts so an early tinc-up finds the socket.
	let server = CoordinationServer::bind(&definition.coordination_socket())
		.map_err(RunError::Coordination)?;
	let (mailbox_tx, mailbox_rx) = mpsc::channel(1);

	// tincd calls its down scripts while exiting; the socket stays open until
	// the process is gone and answers `rejected` once `abort` fired.
	let process_exited = CancellationToken::new();
	let process = {
		let exited = process_exited.clone();
		let (definition, tincd, abort) = (&definition, &settings.tincd, abort.clone());
		async move {
			let _exited = exited.drop_guard();
			run_process(definition, tincd, &pgid, abort).await
		}
	};
	let coordination = {
		let abort = abort.clone();
		async move {
			let _abort = abort.clone().drop_guard();
			server.serve(mailbox_tx, abort, process_exited).await;
		}
	};
	let tracking = {
		let abort = abort.clone();
		async move {
			let _abort = abort.clone().drop_guard();
			tracker.run(mailbox_rx, abort).await;
		}
	};

	let (process, (), ()) = tokio::join!(process, coordination, tracking);
	process
}

async fn run_process(
	definition: &Network,
	tincd: &Path,
	pgid: &AtomicU32,
	abort: CancellationToken,
) -> Result<(), RunError> {
	let _abort = abort.clone().drop_guard();

	let mut command = Command::new(tincd);
	command
		.args(["-D", "-d", "-d", "-d", "--pidfile"])
		.arg(definition.pidfile())
		.arg("--logfile")
		.arg(definition.logfile())
		.args(["-c", "."])
		.current_dir(definition.root())
		.stdin(Stdio::null())
		.stdout(Stdio::inherit())
		.stderr(Stdio::inherit())
		.kill_on_drop(true);
	#[cfg(unix)]
	command.process_group(0);

	let mut child = command.spawn().map_err(RunError::Spawn)?;
	pgid.store(child.id().unwrap_or(0), Ordering::SeqCst);
	info!(network = %definition.name(), pid = child.id(), "tincd started");

	let outcome = tokio::select! {
		status = child.wait() => match status {
			// Only a stop request ends tincd legitimately, whatever its status.
			Ok(status) => Err(RunError::ProcessExit(status)),
			Err(e) => Err(RunError::Wait(e)),
		},
		_ = abort.cancelled() => {
			terminate(&mut child);
			child.wait().await.map_err(RunError::Wait).map(|status| {
				info!(network = %definition.name(), %status, "tincd stopped");
			})
		}
	};
	pgid.store(0, Ordering::SeqCst);
	outcome
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
	if let Some(pid) = child.id() {
		signal_group(pid, libc::SIGTERM);
	}
}

/// Signals every process in the group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
	let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
	if rc != 0 {
		warn!(pid, signal, error = %std::io::Error::last_os_error(), "failed to signal tincd process group");
	}
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
	if let Err(e) = child.start_kill() {
		warn!(error = %e, "failed to kill tincd");
	}
}
