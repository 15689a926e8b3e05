// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The shared on-disk source tree.
//!
//! Published content is copied into a fresh directory under
//! `root/.versions/` and then exposed at `root/<namespace>/<repository>/<path>`
//! by renaming a symlink over the old one. Readers see either the previous
//! version or the new one, never a partial copy.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use stratum_k8s::SourceRef;
use stratum_layers::{relative_source_path, source_path};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::SyncError;

const VERSIONS_DIR: &str = ".versions";

#[derive(Debug, Clone)]
pub struct SourceTree {
	root: PathBuf,
}

impl SourceTree {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Where `source` is visible to readers.
	pub fn target(&self, source: &SourceRef) -> PathBuf {
		source_path(&self.root, source)
	}

	/// Publish `extracted/<source.path>` for `source`, returning the target path.
	pub async fn publish(&self, extracted: &Path, source: &SourceRef) -> Result<PathBuf, SyncError> {
		let tree = self.clone();
		let extracted = extracted.to_path_buf();
		let source = source.clone();
		tokio::task::spawn_blocking(move || tree.publish_blocking(&extracted, &source)).await?
	}

	pub fn publish_blocking(&self, extracted: &Path, source: &SourceRef) -> Result<PathBuf, SyncError> {
		let relative = relative_source_path(&source.path);
		let content = extracted.join(&relative);
		if !content.is_dir() {
			return Err(SyncError::MissingSourcePath { path: relative });
		}

		let target = self.target(source);
		let versions = self.versions_dir(source, &relative);
		let version = versions.join(Uuid::new_v4().to_string());
		let publish_err = |path: &Path| {
			let path = path.to_path_buf();
			move |source: io::Error| SyncError::Publish { path, source }
		};

		fs::create_dir_all(&versions).map_err(publish_err(&versions))?;
		copy_dir(&content, &version).map_err(publish_err(&version))?;

		let previous = swap_link(&target, &version, &versions).map_err(publish_err(&target))?;
		debug!(target = %target.display(), version = %version.display(), "published source");

		if let Err(e) = collect_versions(&versions, &version, previous.as_deref()) {
			warn!(dir = %versions.display(), error = %e, "failed to remove old source versions");
		}
		Ok(target)
	}

	/// `root/.versions/<namespace>/<repository>/<digest of path>`
	fn versions_dir(&self, source: &SourceRef, relative: &Path) -> PathBuf {
		let digest = hex::encode(Sha256::digest(relative.to_string_lossy().as_bytes()));
		self.root
			.join(VERSIONS_DIR)
			.join(&source.namespace)
			.join(&source.name)
			.join(&digest[..16])
	}
}

/// Point `target` at `version`, returning the version it pointed at before.
///
/// A real directory found at `target` cannot be swapped atomically. It is
/// moved into `versions` right before the link is renamed into place, so
/// there is a short window without a target on that first publish only. The
/// moved directory is returned as the previous version and survives one more
/// publish.
fn swap_link(target: &Path, version: &Path, versions: &Path) -> io::Result<Option<PathBuf>> {
	let parent = target
		.parent()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
	fs::create_dir_all(parent)?;

	let leaf = target
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	let tmp = parent.join(format!(".{leaf}.{}.tmp", Uuid::new_v4()));
	symlink(version, &tmp)?;

	let discard = |e: io::Error| {
		let _ = fs::remove_file(&tmp);
		e
	};

	let previous = match fs::symlink_metadata(target) {
		Ok(meta) if meta.file_type().is_symlink() => fs::read_link(target).ok(),
		Ok(meta) if meta.is_dir() => {
			let displaced = versions.join(format!("displaced-{}", Uuid::new_v4()));
			fs::rename(target, &displaced).map_err(discard)?;
			Some(displaced)
		}
		// rename replaces a plain file atomically
		Ok(_) => None,
		Err(e) if e.kind() == io::ErrorKind::NotFound => None,
		Err(e) => return Err(discard(e)),
	};

	fs::rename(&tmp, target).map_err(discard)?;
	Ok(previous)
}

/// Remove every version except the current and previous one.
fn collect_versions(versions: &Path, current: &Path, previous: Option<&Path>) -> io::Result<()> {
	for entry in fs::read_dir(versions)? {
		let path = entry?.path();
		if path == current || Some(path.as_path()) == previous {
			continue;
		}
		fs::remove_dir_all(&path)?;
	}
	Ok(())
}

/// Copy a directory tree, recreating symlinks instead of following them.
fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
	fs::create_dir_all(to)?;
	for entry in WalkDir::new(from).follow_links(false).min_depth(1) {
		let entry = entry?;
		let relative = entry
			.path()
			.strip_prefix(from)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
		let dest = to.join(relative);
		let kind = entry.file_type();
		if kind.is_dir() {
			fs::create_dir_all(&dest)?;
		} else if kind.is_symlink() {
			symlink(fs::read_link(entry.path())?, &dest)?;
		} else {
			fs::copy(entry.path(), &dest)?;
		}
	}
	Ok(())
}
