// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconcile pass behaviour against an in-memory cluster and a scripted executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use stratum_controller::{ExecutorError, ManagedRef, ObsoleteSet, ReconcileError, Reconciler, Requeue};
use stratum_controller::executor::Executor;
use stratum_k8s::{K8sError, Layer, LayerSpec, LayerState, LayerStatus, MockK8sClient, PreReqs, SourceRef};
use stratum_layers::conditions::{
	REASON_DEPENDENCY_CYCLE, REASON_LISTING_FAILED, REASON_VERSION_QUERY_FAILED,
};

const INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
	PruneIsRequired,
	Prune,
	ApplyIsRequired,
	Apply,
	ApplyWasSuccessful,
}

#[derive(Default)]
struct Script {
	prune_required: bool,
	apply_required: bool,
	ready: bool,
	fail_prune: bool,
	fail_apply: bool,
	fail_queries: bool,
	calls: Vec<Call>,
}

/// Executor answering from a script and recording every call.
#[derive(Default)]
struct FakeExecutor {
	script: Mutex<Script>,
	on_apply: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeExecutor {
	fn with(f: impl FnOnce(&mut Script)) -> Arc<Self> {
		let executor = Self::default();
		f(&mut executor.script.lock().unwrap());
		Arc::new(executor)
	}

	fn update(&self, f: impl FnOnce(&mut Script)) {
		f(&mut self.script.lock().unwrap());
	}

	fn calls(&self) -> Vec<Call> {
		self.script.lock().unwrap().calls.clone()
	}

	fn mutations(&self) -> usize {
		self.calls()
			.iter()
			.filter(|c| matches!(c, Call::Prune | Call::Apply))
			.count()
	}

	fn record(&self, call: Call) -> Result<(), ExecutorError> {
		let mut script = self.script.lock().unwrap();
		script.calls.push(call);
		let fail = match call {
			Call::Prune => script.fail_prune,
			Call::Apply => script.fail_apply,
			_ => script.fail_queries,
		};
		if fail {
			return Err(ExecutorError::K8s(K8sError::ApiError {
				message: format!("{call:?} exploded"),
			}));
		}
		Ok(())
	}
}

#[async_trait]
impl Executor for FakeExecutor {
	async fn prune_is_required(&self, _layer: &Layer) -> Result<(bool, ObsoleteSet), ExecutorError> {
		self.record(Call::PruneIsRequired)?;
		let mut obsolete = ObsoleteSet::new();
		let required = self.script.lock().unwrap().prune_required;
		if required {
			obsolete.insert(ManagedRef::new(Some("kube-system"), "old"));
		}
		Ok((required, obsolete))
	}

	async fn prune(&self, _layer: &Layer, _obsolete: &ObsoleteSet) -> Result<(), ExecutorError> {
		self.record(Call::Prune)
	}

	async fn apply_is_required(&self, _layer: &Layer) -> Result<bool, ExecutorError> {
		self.record(Call::ApplyIsRequired)?;
		Ok(self.script.lock().unwrap().apply_required)
	}

	async fn apply(&self, _layer: &Layer) -> Result<(), ExecutorError> {
		self.record(Call::Apply)?;
		if let Some(hook) = self.on_apply.lock().unwrap().as_ref() {
			hook();
		}
		Ok(())
	}

	async fn apply_was_successful(&self, _layer: &Layer) -> Result<bool, ExecutorError> {
		self.record(Call::ApplyWasSuccessful)?;
		Ok(self.script.lock().unwrap().ready)
	}
}

fn layer(name: &str, depends_on: &[&str]) -> Layer {
	Layer::new(name, LayerSpec {
		source: SourceRef {
			namespace: "gitops".to_string(),
			name: "addons".to_string(),
			path: name.to_string(),
		},
		version: "1.0.0".to_string(),
		hold: false,
		prereqs: PreReqs::default(),
		interval: "30s".to_string(),
		depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
	})
}

fn with_state(mut layer: Layer, state: LayerState) -> Layer {
	layer.status = Some(LayerStatus {
		state: Some(state),
		..Default::default()
	});
	layer
}

fn setup(layers: Vec<Layer>, executor: Arc<FakeExecutor>) -> (Arc<MockK8sClient>, Reconciler) {
	let client = Arc::new(MockK8sClient::new());
	for layer in layers {
		client.insert_layer(layer);
	}
	let reconciler = Reconciler::new(client.clone(), executor);
	(client, reconciler)
}

fn state_of(client: &MockK8sClient, name: &str) -> Option<LayerState> {
	client.layer(name)?.status?.state
}

fn last_reason(client: &MockK8sClient, name: &str) -> String {
	client
		.layer(name)
		.and_then(|l| l.status)
		.and_then(|s| s.conditions.last().map(|c| c.reason.clone()))
		.unwrap_or_default()
}

#[tokio::test]
async fn layer_without_dependencies_applies_then_deploys() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(vec![layer("x", &[])], executor.clone());

	let requeue = reconciler.reconcile("x").await.unwrap();
	assert_eq!(requeue, Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "x"), Some(LayerState::Applying));
	assert_eq!(executor.calls().last(), Some(&Call::Apply));

	executor.update(|s| {
		s.apply_required = false;
		s.ready = true;
	});
	let requeue = reconciler.reconcile("x").await.unwrap();
	assert_eq!(state_of(&client, "x"), Some(LayerState::Deployed));
	assert_eq!(requeue, Requeue::Immediate);

	let writes = client.status_writes().len();
	let requeue = reconciler.reconcile("x").await.unwrap();
	assert_eq!(requeue, Requeue::None);
	assert_eq!(client.status_writes().len(), writes);
	let deployed = client
		.layer("x")
		.unwrap()
		.status
		.unwrap()
		.conditions
		.iter()
		.filter(|c| c.type_ == LayerState::Deployed)
		.count();
	assert_eq!(deployed, 1);
}

#[tokio::test]
async fn undeployed_dependency_blocks_apply() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(
		vec![
			with_state(layer("x", &[]), LayerState::ApplyPending),
			layer("y", &["x"]),
		],
		executor.clone(),
	);

	let requeue = reconciler.reconcile("y").await.unwrap();
	assert_eq!(requeue, Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "y"), None);
	assert_eq!(executor.mutations(), 0);
	assert!(client.status_writes().is_empty());
}

#[tokio::test]
async fn missing_dependency_blocks_apply() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (_client, reconciler) = setup(vec![layer("y", &["ghost"])], executor.clone());

	let requeue = reconciler.reconcile("y").await.unwrap();
	assert_eq!(requeue, Requeue::After(INTERVAL));
	assert_eq!(executor.mutations(), 0);
}

#[tokio::test]
async fn deployed_dependency_allows_apply() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(
		vec![
			with_state(layer("x", &[]), LayerState::Deployed),
			layer("y", &["x"]),
		],
		executor.clone(),
	);

	reconciler.reconcile("y").await.unwrap();
	assert_eq!(state_of(&client, "y"), Some(LayerState::Applying));
	assert_eq!(executor.calls().last(), Some(&Call::Apply));
}

#[tokio::test]
async fn apply_failure_marks_failed_and_requeues_immediately() {
	let executor = FakeExecutor::with(|s| {
		s.apply_required = true;
		s.fail_apply = true;
	});
	let (client, reconciler) = setup(vec![layer("x", &[])], executor);

	let requeue = reconciler.reconcile("x").await.unwrap();
	assert_eq!(requeue, Requeue::Immediate);
	let status = client.layer("x").unwrap().status.unwrap();
	assert_eq!(status.state, Some(LayerState::Failed));
	assert!(status.conditions.last().unwrap().message.contains("Apply exploded"));
}

#[tokio::test]
async fn query_failure_marks_failed() {
	let executor = FakeExecutor::with(|s| s.fail_queries = true);
	let (client, reconciler) = setup(vec![layer("x", &[])], executor.clone());

	let requeue = reconciler.reconcile("x").await.unwrap();
	assert_eq!(requeue, Requeue::Immediate);
	assert_eq!(state_of(&client, "x"), Some(LayerState::Failed));
	assert_eq!(executor.calls(), vec![Call::PruneIsRequired]);
}

#[tokio::test]
async fn hold_never_calls_the_executor() {
	let executor = FakeExecutor::with(|s| {
		s.prune_required = true;
		s.apply_required = true;
	});
	let mut held = layer("x", &[]);
	held.spec.hold = true;
	let (client, reconciler) = setup(vec![held], executor.clone());

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::Immediate);
	assert_eq!(state_of(&client, "x"), Some(LayerState::Hold));
	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::None);
	assert_eq!(client.status_writes().len(), 1);
	assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn absent_layer_is_a_no_op() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(Vec::new(), executor.clone());

	assert_eq!(reconciler.reconcile("ghost").await.unwrap(), Requeue::None);
	assert!(executor.calls().is_empty());
	assert!(client.status_writes().is_empty());
}

#[tokio::test]
async fn layer_deleted_during_pass_ends_quietly() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(vec![layer("x", &[])], executor.clone());
	let hook_client = client.clone();
	*executor.on_apply.lock().unwrap() = Some(Box::new(move || hook_client.remove_layer("x")));

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::None);
	assert!(client.layer("x").is_none());
}

#[tokio::test]
async fn status_write_failure_is_returned() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(vec![layer("x", &[])], executor);
	client.fail_status_update(true);

	let err = reconciler.reconcile("x").await.unwrap_err();
	assert!(matches!(err, ReconcileError::K8s(_)));
}

#[tokio::test]
async fn prune_runs_alone_in_its_pass() {
	let executor = FakeExecutor::with(|s| {
		s.prune_required = true;
		s.apply_required = true;
	});
	let (client, reconciler) = setup(vec![layer("x", &[])], executor.clone());

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "x"), Some(LayerState::Pruning));
	assert_eq!(executor.calls(), vec![Call::PruneIsRequired, Call::Prune]);

	executor.update(|s| s.prune_required = false);
	reconciler.reconcile("x").await.unwrap();
	assert_eq!(state_of(&client, "x"), Some(LayerState::Applying));
	let states: Vec<LayerState> = client
		.layer("x")
		.unwrap()
		.status
		.unwrap()
		.conditions
		.iter()
		.map(|c| c.type_)
		.collect();
	assert_eq!(
		states,
		vec![LayerState::Pruning, LayerState::Pruned, LayerState::Applying]
	);
}

#[tokio::test]
async fn cluster_below_prerequisite_waits() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let mut gated = layer("x", &[]);
	gated.spec.prereqs.k8s_version = "v1.30".to_string();
	let (client, reconciler) = setup(vec![gated], executor.clone());
	client.set_server_version("v1.29.4");

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "x"), Some(LayerState::WaitingForClusterVersion));
	assert!(executor.calls().is_empty());

	let writes = client.status_writes().len();
	reconciler.reconcile("x").await.unwrap();
	assert_eq!(client.status_writes().len(), writes);

	client.set_server_version("v1.30.1+k3s1");
	reconciler.reconcile("x").await.unwrap();
	assert_eq!(state_of(&client, "x"), Some(LayerState::Applying));
}

#[tokio::test]
async fn version_query_failure_is_a_warning() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let mut gated = layer("x", &[]);
	gated.spec.prereqs.k8s_version = "1.28".to_string();
	let (client, reconciler) = setup(
		vec![with_state(gated, LayerState::Deployed)],
		executor.clone(),
	);
	client.fail_server_version(true);

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "x"), Some(LayerState::Deployed));
	assert_eq!(last_reason(&client, "x"), REASON_VERSION_QUERY_FAILED);
	assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn listing_failure_is_a_warning_not_a_failure() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(
		vec![with_state(layer("y", &["x"]), LayerState::Deployed)],
		executor.clone(),
	);
	client.fail_list_layers(true);

	assert_eq!(reconciler.reconcile("y").await.unwrap(), Requeue::After(INTERVAL));
	assert_eq!(state_of(&client, "y"), Some(LayerState::Deployed));
	assert_eq!(last_reason(&client, "y"), REASON_LISTING_FAILED);
	assert_eq!(executor.mutations(), 0);
}

#[tokio::test]
async fn dependency_cycle_is_reported_and_blocks_apply() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let (client, reconciler) = setup(
		vec![
			with_state(layer("x", &["y"]), LayerState::Deployed),
			with_state(layer("y", &["x"]), LayerState::Deployed),
		],
		executor.clone(),
	);

	assert_eq!(reconciler.reconcile("x").await.unwrap(), Requeue::After(INTERVAL));
	assert_eq!(last_reason(&client, "x"), REASON_DEPENDENCY_CYCLE);
	assert_eq!(executor.mutations(), 0);

	let writes = client.status_writes().len();
	reconciler.reconcile("x").await.unwrap();
	assert_eq!(client.status_writes().len(), writes);
}

#[tokio::test]
async fn invalid_interval_falls_back_to_default() {
	let executor = FakeExecutor::with(|s| s.apply_required = true);
	let mut odd = layer("x", &[]);
	odd.spec.interval = "soon".to_string();
	let (_client, reconciler) = setup(vec![odd], executor);

	assert_eq!(
		reconciler.reconcile("x").await.unwrap(),
		Requeue::After(Duration::from_secs(60))
	);
}

proptest! {
	#[test]
	fn at_most_one_mutation_per_pass(
		hold in any::<bool>(),
		prune_required in any::<bool>(),
		apply_required in any::<bool>(),
		ready in any::<bool>(),
		fail_prune in any::<bool>(),
		fail_apply in any::<bool>(),
	) {
		let executor = FakeExecutor::with(|s| {
			s.prune_required = prune_required;
			s.apply_required = apply_required;
			s.ready = ready;
			s.fail_prune = fail_prune;
			s.fail_apply = fail_apply;
		});
		let mut subject = layer("x", &[]);
		subject.spec.hold = hold;
		let (client, reconciler) = setup(vec![subject], executor.clone());

		let requeue = tokio_test::block_on(reconciler.reconcile("x")).unwrap();

		prop_assert!(executor.mutations() <= 1);
		if hold {
			prop_assert!(executor.calls().is_empty());
		}
		let last = executor.calls().last().copied();
		if matches!(last, Some(Call::Prune) | Some(Call::Apply)) {
			let failed = state_of(&client, "x") == Some(LayerState::Failed);
			if failed {
				prop_assert_eq!(requeue, Requeue::Immediate);
			} else {
				prop_assert_eq!(requeue, Requeue::After(INTERVAL));
			}
		}
	}
}
