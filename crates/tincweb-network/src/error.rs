// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid name '{0}': only letters, digits and '_' are allowed")]
	InvalidName(String),

	#[error("invalid subnet '{0}'")]
	InvalidSubnet(String),

	#[error("node not found: {0}")]
	NodeNotFound(String),

	#[error("network not found at {}", .0.display())]
	NotFound(PathBuf),

	#[error("network already exists at {}", .0.display())]
	AlreadyExists(PathBuf),

	#[error("malformed host file {}: {message}", path.display())]
	HostFile { path: PathBuf, message: String },

	#[error("key generation failed: {0}")]
	KeyGeneration(String),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
