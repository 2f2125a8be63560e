// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::protocol::{PeerEvent, Reply};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Point-in-time view of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
	pub name: String,
	pub online: bool,
	/// Last subnet reported for the node, kept after it goes offline.
	pub subnet: Option<String>,
	pub updated_at: Option<DateTime<Utc>>,
	/// Last event applied to this peer.
	pub last_event: Option<PeerEvent>,
}

impl PeerStatus {
	fn offline(name: String) -> Self {
		Self {
			name,
			online: false,
			subnet: None,
			updated_at: None,
			last_event: None,
		}
	}
}

/// One event waiting in the tracker's mailbox together with the channel its
/// verdict goes back on.
#[derive(Debug)]
pub struct Envelope {
	pub event: PeerEvent,
	pub reply: oneshot::Sender<Reply>,
}

#[derive(Debug)]
struct TrackerState {
	peers: BTreeMap<String, PeerStatus>,
	self_active: bool,
	accepting: bool,
}

/// Connectivity view for one network run.
#[derive(Debug)]
pub struct PeerTracker {
	state: RwLock<TrackerState>,
}

impl PeerTracker {
	/// Seeds the tracker with every node known to the definition, all offline.
	pub fn new<I, S>(nodes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let peers = nodes
			.into_iter()
			.map(Into::into)
			.map(|name: String| (name.clone(), PeerStatus::offline(name)))
			.collect();
		Self {
			state: RwLock::new(TrackerState {
				peers,
				self_active: false,
				accepting: true,
			}),
		}
	}

	/// Name-ordered copy of every peer.
	pub fn list(&self) -> Vec<PeerStatus> {
		self.state.read().peers.values().cloned().collect()
	}

	pub fn get(&self, name: &str) -> Option<PeerStatus> {
		self.state.read().peers.get(name).cloned()
	}

	pub fn len(&self) -> usize {
		self.state.read().peers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether tincd reported the virtual interface as up.
	pub fn is_self_active(&self) -> bool {
		self.state.read().self_active
	}

	pub fn is_accepting(&self) -> bool {
		self.state.read().accepting
	}

	/// Applies one event and returns the verdict for the hook script.
	pub fn apply(&self, event: PeerEvent) -> Reply {
		let mut state = self.state.write();
		if !state.accepting {
			return Reply::rejected("interface is down");
		}

		match &event {
			PeerEvent::InterfaceUp { .. } => {
				state.self_active = true;
			}
			PeerEvent::InterfaceDown { .. } => {
				state.self_active = false;
				state.accepting = false;
			}
			PeerEvent::SubnetUp { node, subnet } | PeerEvent::SubnetDown { node, subnet } => {
				let online = matches!(event, PeerEvent::SubnetUp { .. });
				match state.peers.get_mut(node) {
					Some(peer) => {
						peer.online = online;
						peer.subnet = Some(subnet.clone());
						peer.updated_at = Some(Utc::now());
						peer.last_event = Some(event.clone());
					}
					None => {
						debug!(node = %node, "event for node without host file ignored");
					}
				}
			}
		}

		trace!(kind = event.kind(), node = event.node(), "applied peer event");
		Reply::Accepted
	}

	/// Drains the mailbox until it closes or `cancel` fires.
	///
	/// Envelopes still queued at cancellation are dropped, which the sender
	/// observes as a rejection.
	pub async fn run(&self, mut mailbox: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
		loop {
			tokio::select! {
				biased;

				_ = cancel.cancelled() => break,

				envelope = mailbox.recv() => {
					let Some(Envelope { event, reply }) = envelope else {
						break;
					};
					let verdict = self.apply(event);
					let _ = reply.send(verdict);
				}
			}
		}
		info!(peers = self.len(), "peer tracker stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn subnet_up(node: &str) -> PeerEvent {
		PeerEvent::SubnetUp {
			node: node.to_string(),
			subnet: "10.10.0.2".to_string(),
		}
	}

	fn subnet_down(node: &str) -> PeerEvent {
		PeerEvent::SubnetDown {
			node: node.to_string(),
			subnet: "10.10.0.2".to_string(),
		}
	}

	#[test]
	fn test_new_tracker_lists_all_nodes_offline() {
		let tracker = PeerTracker::new(["zed", "alice", "home"]);
		let peers = tracker.list();
		let names: Vec<_> = peers.iter().map(|p| p.name.as_str()).collect();
		assert_eq!(names, vec!["alice", "home", "zed"]);
		assert!(peers.iter().all(|p| !p.online));
	}

	#[test]
	fn test_subnet_up_then_down_leaves_peer_offline() {
		let tracker = PeerTracker::new(["alice"]);
		assert_eq!(tracker.apply(subnet_up("alice")), Reply::Accepted);
		assert!(tracker.get("alice").unwrap().online);

		assert_eq!(tracker.apply(subnet_down("alice")), Reply::Accepted);
		let alice = tracker.get("alice").unwrap();
		assert!(!alice.online);
		assert_eq!(alice.subnet.as_deref(), Some("10.10.0.2"));
		assert_eq!(alice.last_event, Some(subnet_down("alice")));
	}

	#[test]
	fn test_unknown_nodes_do_not_grow_the_list() {
		let tracker = PeerTracker::new(["alice", "bob"]);
		for i in 0..10 {
			assert_eq!(tracker.apply(subnet_up(&format!("stranger{i}"))), Reply::Accepted);
		}
		assert_eq!(tracker.list().len(), 2);
	}

	#[test]
	fn test_interface_events() {
		let tracker = PeerTracker::new(["alice"]);
		tracker.apply(PeerEvent::InterfaceUp {
			node: "home".to_string(),
			interface: Some("tun0".to_string()),
		});
		assert!(tracker.is_self_active());

		tracker.apply(PeerEvent::InterfaceDown {
			node: "home".to_string(),
			interface: None,
		});
		assert!(!tracker.is_self_active());
		assert!(!tracker.is_accepting());
		assert!(matches!(
			tracker.apply(subnet_up("alice")),
			Reply::Rejected { .. }
		));
		assert!(!tracker.get("alice").unwrap().online);
	}

	#[test]
	fn test_list_returns_copies() {
		let tracker = PeerTracker::new(["alice"]);
		let mut snapshot = tracker.list();
		snapshot[0].online = true;
		assert!(!tracker.get("alice").unwrap().online);
	}

	#[tokio::test]
	async fn test_run_applies_in_order_and_replies() {
		let tracker = std::sync::Arc::new(PeerTracker::new(["alice", "bob"]));
		let (tx, rx) = mpsc::channel(1);
		let cancel = CancellationToken::new();

		let task = {
			let tracker = tracker.clone();
			let cancel = cancel.clone();
			tokio::spawn(async move { tracker.run(rx, cancel).await })
		};

		for event in [subnet_up("alice"), subnet_up("bob"), subnet_down("alice")] {
			let (reply_tx, reply_rx) = oneshot::channel();
			tx.send(Envelope {
				event,
				reply: reply_tx,
			})
			.await
			.unwrap();
			assert_eq!(reply_rx.await.unwrap(), Reply::Accepted);
		}

		assert!(!tracker.get("alice").unwrap().online);
		assert!(tracker.get("bob").unwrap().online);

		drop(tx);
		task.await.unwrap();
	}

	#[tokio::test]
	async fn test_run_stops_on_cancel() {
		let tracker = PeerTracker::new(["alice"]);
		let (_tx, rx) = mpsc::channel::<Envelope>(1);
		let cancel = CancellationToken::new();
		cancel.cancel();
		tokio::time::timeout(std::time::Duration::from_secs(1), tracker.run(rx, cancel))
			.await
			.unwrap();
	}
}
