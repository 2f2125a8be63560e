// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::process::ExitStatus;
use thiserror::Error;
use tincweb_network::NetworkError;
use tokio_util::codec::LinesCodecError;

/// Terminal error of one supervisor run.
#[derive(Debug, Error)]
pub enum RunError {
	#[error("configure: {0}")]
	Configuration(#[source] NetworkError),

	#[error("bind coordination socket: {0}")]
	Coordination(#[source] std::io::Error),

	#[error("spawn tincd: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("wait for tincd: {0}")]
	Wait(#[source] std::io::Error),

	#[error("tincd exited: {0}")]
	ProcessExit(ExitStatus),
}

/// Failures on the hook callback channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed peer event: {0}")]
	Decode(#[from] serde_json::Error),

	#[error("framing error: {0}")]
	Frame(#[from] LinesCodecError),

	#[error("timed out waiting for peer")]
	Timeout,

	#[error("connection closed before a message arrived")]
	ConnectionClosed,
}

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("network already exists: {0}")]
	DuplicateName(String),

	#[error("network not found: {0}")]
	NotFound(String),

	#[error("networks did not stop within the grace period: {}", .0.join(", "))]
	ShutdownTimeout(Vec<String>),

	#[error("network definition error: {0}")]
	Definition(#[from] NetworkError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
