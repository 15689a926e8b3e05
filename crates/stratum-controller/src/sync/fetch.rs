// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::ArtifactNotification;
use crate::error::SyncError;

/// Downloads artifact tarballs from the source controller.
pub struct ArtifactFetcher {
	client: Client,
	source_host: Option<String>,
}

impl ArtifactFetcher {
	pub fn new(timeout: Duration, source_host: Option<String>) -> Result<Self, SyncError> {
		let client = Client::builder()
			.user_agent(format!("stratum-controller/{}", env!("CARGO_PKG_VERSION")))
			.timeout(timeout)
			.build()
			.map_err(SyncError::Client)?;
		Ok(Self {
			client,
			source_host,
		})
	}

	/// URL to download the artifact from, honouring the source host override.
	pub fn artifact_url(&self, notification: &ArtifactNotification) -> String {
		match &self.source_host {
			Some(host) => format!(
				"http://{host}/gitrepository/{}/{}/latest.tar.gz",
				notification.namespace, notification.name
			),
			None => notification.url.clone(),
		}
	}

	/// Download the artifact body. Anything but `200 OK` is a failure.
	#[instrument(skip(self, notification), fields(repository = %notification.key()))]
	pub async fn fetch(&self, notification: &ArtifactNotification) -> Result<Vec<u8>, SyncError> {
		let url = self.artifact_url(notification);
		let fetch_err = |source| SyncError::Fetch {
			url: url.clone(),
			source,
		};

		let response = self.client.get(&url).send().await.map_err(fetch_err)?;
		if response.status() != StatusCode::OK {
			return Err(SyncError::Status {
				url,
				status: response.status().as_u16(),
			});
		}
		let body = response.bytes().await.map_err(fetch_err)?;
		debug!(bytes = body.len(), "downloaded artifact");
		Ok(body.to_vec())
	}
}

/// Extract a gzip tarball into `dest`.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<(), SyncError> {
	let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
	archive.set_preserve_permissions(true);
	archive.unpack(dest).map_err(SyncError::Extract)
}
