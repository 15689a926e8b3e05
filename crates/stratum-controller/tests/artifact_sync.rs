// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact Sync against a stub source controller.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use stratum_controller::{ArtifactFetcher, ArtifactSync, SourceTree, SyncOutcome};
use stratum_k8s::{
	Artifact, GitRepository, GitRepositorySpec, GitRepositoryStatus, Layer, LayerSpec, MockK8sClient,
	PreReqs, SourceRef,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
	let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
	for (name, content) in files {
		let mut header = tar::Header::new_gnu();
		header.set_size(content.len() as u64);
		header.set_mode(0o644);
		header.set_cksum();
		builder
			.append_data(&mut header, name, content.as_bytes())
			.unwrap();
	}
	builder.into_inner().unwrap().finish().unwrap()
}

fn repository(url: &str, revision: &str) -> GitRepository {
	let mut repo = GitRepository::new("addons", GitRepositorySpec::default());
	repo.metadata.namespace = Some("gitops".to_string());
	repo.status = Some(GitRepositoryStatus {
		artifact: Some(Artifact {
			url: url.to_string(),
			revision: revision.to_string(),
			digest: None,
		}),
	});
	repo
}

fn layer(name: &str, repository: &str, path: &str) -> Layer {
	Layer::new(name, LayerSpec {
		source: SourceRef {
			namespace: "gitops".to_string(),
			name: repository.to_string(),
			path: path.to_string(),
		},
		version: "1.0.0".to_string(),
		hold: false,
		prereqs: PreReqs::default(),
		interval: "60s".to_string(),
		depends_on: Vec::new(),
	})
}

fn client(layers: Vec<Layer>) -> Arc<MockK8sClient> {
	let client = Arc::new(MockK8sClient::new());
	for layer in layers {
		client.insert_layer(layer);
	}
	client
}

fn sync_with(
	root: &Path,
	client: Arc<MockK8sClient>,
	source_host: Option<String>,
	timeout: Duration,
) -> ArtifactSync {
	let fetcher = ArtifactFetcher::new(timeout, source_host).unwrap();
	ArtifactSync::new(client, fetcher, SourceTree::new(root))
}

fn sync(root: &Path, layers: Vec<Layer>, source_host: Option<String>) -> ArtifactSync {
	sync_with(root, client(layers), source_host, Duration::from_secs(5))
}

#[tokio::test]
async fn missing_artifact_produces_no_requests() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(ResponseTemplate::new(404))
		.expect(1)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync(root.path(), vec![layer("base", "addons", "base")], None);
	let repo = repository(&format!("{}/addons.tar.gz", server.uri()), "main@sha1:abc");

	let outcome = sync.handle(&repo).await;
	assert_eq!(outcome, SyncOutcome::default());
	assert!(!root.path().join("gitops/addons/base").exists());
}

#[tokio::test]
async fn artifact_is_published_for_matching_layers() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(ResponseTemplate::new(200).set_body_bytes(tarball(&[
			("base/cilium.yaml", "kind: HelmRelease"),
			("apps/app.yaml", "kind: HelmRelease"),
		])))
		.expect(1)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync(
		root.path(),
		vec![
			layer("base", "addons", "base"),
			layer("apps", "addons", "./apps"),
			layer("other", "platform", "base"),
		],
		None,
	);
	let repo = repository(&format!("{}/addons.tar.gz", server.uri()), "main@sha1:abc");

	let mut outcome = sync.handle(&repo).await;
	outcome.requests.sort();
	assert_eq!(outcome.requests, vec!["apps".to_string(), "base".to_string()]);
	assert_eq!(outcome.published, 2);
	assert_eq!(outcome.failed, 0);
	assert!(root.path().join("gitops/addons/base/cilium.yaml").is_file());
	assert!(root.path().join("gitops/addons/apps/app.yaml").is_file());
	assert!(!root.path().join("gitops/platform").exists());

	let again = sync.handle(&repo).await;
	assert!(again.skipped);
	assert!(again.requests.is_empty());
}

#[tokio::test]
async fn one_failing_layer_does_not_stop_the_others() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_bytes(tarball(&[("base/cilium.yaml", "kind: HelmRelease")])),
		)
		.expect(2)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync(
		root.path(),
		vec![
			layer("base", "addons", "base"),
			layer("missing", "addons", "not-in-artifact"),
		],
		None,
	);
	let repo = repository(&format!("{}/addons.tar.gz", server.uri()), "main@sha1:abc");

	let outcome = sync.handle(&repo).await;
	assert_eq!(outcome.requests, vec!["base".to_string()]);
	assert_eq!(outcome.published, 1);
	assert_eq!(outcome.failed, 1);

	// the revision is retried because it was not fully published
	let retry = sync.handle(&repo).await;
	assert!(!retry.skipped);
	assert_eq!(retry.failed, 1);
}

#[tokio::test]
async fn source_host_overrides_artifact_url() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/gitrepository/gitops/addons/latest.tar.gz"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_bytes(tarball(&[("base/cilium.yaml", "kind: HelmRelease")])),
		)
		.expect(1)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync(
		root.path(),
		vec![layer("base", "addons", "base")],
		Some(server.address().to_string()),
	);
	let repo = repository("http://source-controller.invalid/addons.tar.gz", "main@sha1:def");

	let outcome = sync.handle(&repo).await;
	assert_eq!(outcome.requests, vec!["base".to_string()]);
}

#[tokio::test]
async fn repository_without_artifact_is_ignored() {
	let root = tempfile::tempdir().unwrap();
	let sync = sync(root.path(), vec![layer("base", "addons", "base")], None);
	let mut repo = repository("", "");
	repo.status = None;

	assert_eq!(sync.handle(&repo).await, SyncOutcome::default());
}

#[tokio::test]
async fn layer_added_after_sync_gets_its_path_published() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(ResponseTemplate::new(200).set_body_bytes(tarball(&[
			("base/cilium.yaml", "kind: HelmRelease"),
			("apps/app.yaml", "kind: HelmRelease"),
		])))
		.expect(2)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let client = client(vec![layer("base", "addons", "base")]);
	let sync = sync_with(root.path(), client.clone(), None, Duration::from_secs(5));
	let repo = repository(&format!("{}/addons.tar.gz", server.uri()), "main@sha1:abc");

	let first = sync.handle(&repo).await;
	assert_eq!(first.requests, vec!["base".to_string()]);
	assert!(!root.path().join("gitops/addons/apps").exists());

	client.insert_layer(layer("apps", "addons", "apps"));
	let mut second = sync.handle(&repo).await;
	second.requests.sort();
	assert!(!second.skipped);
	assert_eq!(second.requests, vec!["apps".to_string(), "base".to_string()]);
	assert!(root.path().join("gitops/addons/apps/app.yaml").is_file());

	// same revision, same paths
	let third = sync.handle(&repo).await;
	assert!(third.skipped);
}

#[tokio::test]
async fn layers_sharing_a_path_are_published_once() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_bytes(tarball(&[("base/cilium.yaml", "kind: HelmRelease")])),
		)
		.expect(2)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync(
		root.path(),
		vec![
			layer("base", "addons", "base"),
			layer("base-mirror", "addons", "./base"),
		],
		None,
	);
	let url = format!("{}/addons.tar.gz", server.uri());

	let first = sync.handle(&repository(&url, "main@sha1:abc")).await;
	assert_eq!(first.published, 1);
	let target = root.path().join("gitops/addons/base");
	let in_use = std::fs::read_link(&target).unwrap();

	let mut second = sync.handle(&repository(&url, "main@sha1:def")).await;
	second.requests.sort();
	assert_eq!(second.published, 1);
	assert_eq!(
		second.requests,
		vec!["base".to_string(), "base-mirror".to_string()]
	);
	assert!(in_use.join("cilium.yaml").is_file());
	assert_ne!(std::fs::read_link(&target).unwrap(), in_use);
}

#[tokio::test]
async fn slow_artifact_server_times_out() {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/addons.tar.gz"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_bytes(tarball(&[("base/cilium.yaml", "kind: HelmRelease")]))
				.set_delay(Duration::from_secs(3)),
		)
		.mount(&server)
		.await;

	let root = tempfile::tempdir().unwrap();
	let sync = sync_with(
		root.path(),
		client(vec![layer("base", "addons", "base")]),
		None,
		Duration::from_millis(200),
	);
	let repo = repository(&format!("{}/addons.tar.gz", server.uri()), "main@sha1:abc");

	let started = std::time::Instant::now();
	let outcome = sync.handle(&repo).await;
	assert!(started.elapsed() < Duration::from_secs(3));
	assert_eq!(outcome, SyncOutcome::default());
	assert!(!root.path().join("gitops/addons/base").exists());
}
