//! Tests of the child condition reconciler in isolation
//!
//! The child objects here are created by hand, the way a user could apply an
//! `AlertsNrqlCondition` / `AlertsApmCondition` next to an existing policy.

mod common;

use alerts_policy_controller::constants::{CONDITION_FINALIZER, POLICY_LABEL};
use alerts_policy_controller::controller::reconciler::{
    reconcile_condition, ConditionOutcome, ReconcilerError,
};
use alerts_policy_controller::crd::{
    Condition, ConditionKind, ConditionSpec, IncidentPreference, ResourceKey,
};
use alerts_policy_controller::provider::AlertsClient;
use alerts_policy_controller::store::{ChildCondition, ConditionStore};
use common::{apm, nrql, Call, Failure, Harness, API_KEY, NAMESPACE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

fn ready(child: &ChildCondition) -> Option<Condition> {
    let conditions = match child {
        ChildCondition::Nrql(object) => object.status.as_ref().map(|s| s.conditions.clone()),
        ChildCondition::Apm(object) => object.status.as_ref().map(|s| s.conditions.clone()),
    };
    conditions?.into_iter().find(|c| c.r#type == "Ready")
}

/// Store a standalone child targeting remote policy `policy_id`
fn put_child(harness: &Harness, name: &str, mut spec: ConditionSpec, policy_id: Option<i64>) -> ResourceKey {
    let base = spec.base_mut();
    base.api_key = Some(API_KEY.to_string());
    base.existing_policy_id = policy_id;
    let child = ChildCondition::from_spec(
        spec,
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            generation: Some(1),
            ..ObjectMeta::default()
        },
    );
    let key = child.key();
    harness.store.put_child(child);
    key
}

fn stored(harness: &Harness, kind: ConditionKind, key: &ResourceKey) -> ChildCondition {
    harness
        .store
        .children()
        .into_iter()
        .find(|child| child.kind() == kind && &child.key() == key)
        .expect("child stored")
}

/// Replace the spec of a stored child, keeping its metadata and status
fn edit_spec(harness: &Harness, kind: ConditionKind, key: &ResourceKey, edit: impl FnOnce(&mut ConditionSpec)) {
    let mut child = stored(harness, kind, key);
    let mut spec = child.spec();
    edit(&mut spec);
    child.set_spec(spec).expect("same kind");
    harness.store.put_child(child);
}

fn set_threshold(threshold: &str) -> impl FnOnce(&mut ConditionSpec) + '_ {
    move |spec| spec.base_mut().terms[0].threshold = threshold.to_string()
}

#[tokio::test]
async fn test_new_child_creates_remote_condition() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));

    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("pass succeeds");

    let ConditionOutcome::Converged { condition_id } = outcome else {
        panic!("expected Converged, got {outcome:?}");
    };
    assert_eq!(
        harness.remote.writes(),
        vec![Call::CreateCondition {
            kind: ConditionKind::Nrql,
            policy_id,
            name: "errors".to_string(),
        }]
    );

    let child = stored(&harness, ConditionKind::Nrql, &key);
    assert_eq!(child.condition_id(), Some(condition_id));
    assert!(child
        .metadata()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == CONDITION_FINALIZER)));
    assert_eq!(ready(&child).map(|c| c.status), Some("True".to_string()));
}

#[tokio::test]
async fn test_unchanged_child_makes_no_remote_calls() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "apdex", apm("Apdex", "0.7").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Apm, &key)
        .await
        .expect("first pass");
    harness.remote.clear_calls();

    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Apm, &key)
        .await
        .expect("second pass");

    assert!(matches!(outcome, ConditionOutcome::Unchanged { .. }));
    assert!(harness.remote.calls().is_empty());
}

#[tokio::test]
async fn test_changed_child_updates_remote_condition() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("first pass");
    let condition_id = stored(&harness, ConditionKind::Nrql, &key)
        .condition_id()
        .expect("condition ID");
    harness.remote.clear_calls();

    edit_spec(&harness, ConditionKind::Nrql, &key, set_threshold("9"));
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("update pass");

    assert_eq!(outcome, ConditionOutcome::Converged { condition_id });
    assert_eq!(
        harness.remote.writes(),
        vec![Call::UpdateCondition {
            kind: ConditionKind::Nrql,
            condition_id
        }]
    );
    assert_eq!(harness.remote.conditions()[0].1.spec.base().terms[0].threshold, "9");
}

#[tokio::test]
async fn test_existing_remote_condition_is_adopted() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let existing = harness.remote.seed_condition(policy_id, apm("Apdex", "0.7").spec);
    let key = put_child(&harness, "apdex", apm("Apdex", "0.5").spec, Some(policy_id));

    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Apm, &key)
        .await
        .expect("pass succeeds");

    assert_eq!(outcome, ConditionOutcome::Converged { condition_id: existing });
    assert_eq!(
        harness.remote.writes(),
        vec![Call::UpdateCondition {
            kind: ConditionKind::Apm,
            condition_id: existing
        }]
    );
    assert_eq!(harness.remote.conditions().len(), 1);
}

/// Mark a stored child as belonging to policy object `policy`
fn label_child(harness: &Harness, kind: ConditionKind, key: &ResourceKey, policy: &str) {
    let mut child = stored(harness, kind, key);
    child.metadata_mut().labels = Some(
        [(POLICY_LABEL.to_string(), policy.to_string())]
            .into_iter()
            .collect(),
    );
    harness.store.put_child(child);
}

#[tokio::test]
async fn test_remote_condition_of_a_sibling_is_not_adopted() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let owner = put_child(&harness, "checkout-a", nrql("errors", "5").spec, Some(policy_id));
    label_child(&harness, ConditionKind::Nrql, &owner, "checkout");
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &owner)
        .await
        .expect("owner pushed");
    let owned_id = stored(&harness, ConditionKind::Nrql, &owner)
        .condition_id()
        .expect("condition ID");

    let newcomer = put_child(&harness, "checkout-b", nrql("errors", "7").spec, Some(policy_id));
    label_child(&harness, ConditionKind::Nrql, &newcomer, "checkout");
    harness.remote.clear_calls();
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &newcomer)
        .await
        .expect("newcomer pushed");

    let ConditionOutcome::Converged { condition_id } = outcome else {
        panic!("expected Converged, got {outcome:?}");
    };
    assert_ne!(condition_id, owned_id);
    assert_eq!(
        harness.remote.count(|c| matches!(c, Call::CreateCondition { .. })),
        1
    );
    assert_eq!(
        harness.remote.count(|c| matches!(c, Call::UpdateCondition { .. })),
        0
    );
    assert_eq!(harness.remote.conditions().len(), 2);
}

#[tokio::test]
async fn test_condition_deleted_remotely_is_recreated() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("first pass");
    let old_id = stored(&harness, ConditionKind::Nrql, &key)
        .condition_id()
        .expect("condition ID");
    harness
        .remote
        .delete_nrql_condition(old_id)
        .await
        .expect("out-of-band delete");
    harness.remote.clear_calls();

    edit_spec(&harness, ConditionKind::Nrql, &key, set_threshold("6"));
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("pass succeeds");

    let ConditionOutcome::Converged { condition_id } = outcome else {
        panic!("expected Converged, got {outcome:?}");
    };
    assert_ne!(condition_id, old_id);
    assert_eq!(
        harness
            .remote
            .count(|c| matches!(c, Call::CreateCondition { .. })),
        1
    );
    assert_eq!(
        stored(&harness, ConditionKind::Nrql, &key).condition_id(),
        Some(condition_id)
    );
}

#[tokio::test]
async fn test_failed_push_records_not_ready() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    harness
        .remote
        .fail("create_nrql_condition", Failure::ServerError);

    let error = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect_err("create fails");

    assert!(matches!(error, ReconcilerError::RemoteCreate { .. }));
    let child = stored(&harness, ConditionKind::Nrql, &key);
    assert_eq!(child.condition_id(), None);
    let condition = ready(&child).expect("Ready condition");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some("RemoteCreateFailed"));

    harness.remote.heal("create_nrql_condition");
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("retry succeeds");
    let child = stored(&harness, ConditionKind::Nrql, &key);
    assert!(child.condition_id().is_some());
    assert_eq!(ready(&child).map(|c| c.status), Some("True".to_string()));
}

#[tokio::test]
async fn test_reverted_spec_clears_failure_without_remote_calls() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("first pass");

    harness
        .remote
        .fail("update_nrql_condition", Failure::ServerError);
    edit_spec(&harness, ConditionKind::Nrql, &key, set_threshold("50"));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect_err("update fails");
    harness.remote.clear_calls();

    edit_spec(&harness, ConditionKind::Nrql, &key, set_threshold("5"));
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("reverted spec is already applied");

    assert!(matches!(outcome, ConditionOutcome::Unchanged { .. }));
    assert!(harness.remote.calls().is_empty());
    let child = stored(&harness, ConditionKind::Nrql, &key);
    assert_eq!(ready(&child).map(|c| c.status), Some("True".to_string()));
}

#[tokio::test]
async fn test_missing_policy_id_is_a_configuration_error() {
    let harness = Harness::new();
    let key = put_child(&harness, "orphan", nrql("orphan", "5").spec, None);

    let error = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect_err("no target policy");

    assert!(matches!(error, ReconcilerError::Configuration(ref m) if m.contains("existingPolicyId")));
    assert!(harness.remote.calls().is_empty());
    let child = stored(&harness, ConditionKind::Nrql, &key);
    assert_eq!(
        ready(&child).and_then(|c| c.reason),
        Some("InvalidConfiguration".to_string())
    );
}

#[tokio::test]
async fn test_deleted_child_removes_remote_condition() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("first pass");
    let condition_id = stored(&harness, ConditionKind::Nrql, &key)
        .condition_id()
        .expect("condition ID");

    harness
        .store
        .delete_condition(ConditionKind::Nrql, &key)
        .await
        .expect("delete marks the child");
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("teardown succeeds");

    assert_eq!(outcome, ConditionOutcome::Deleted);
    assert!(harness.store.children().is_empty(), "finalizer released");
    assert_eq!(
        harness.remote.count(|c| *c
            == Call::DeleteCondition {
                kind: ConditionKind::Nrql,
                condition_id
            }),
        1
    );
    assert!(harness.remote.conditions().is_empty());
}

#[tokio::test]
async fn test_teardown_tolerates_missing_remote_condition() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "apdex", apm("Apdex", "0.7").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Apm, &key)
        .await
        .expect("first pass");
    harness.remote.remove_policy(policy_id);

    harness
        .store
        .delete_condition(ConditionKind::Apm, &key)
        .await
        .expect("delete marks the child");
    let outcome = reconcile_condition(&harness.reconciler, ConditionKind::Apm, &key)
        .await
        .expect("not found counts as deleted");

    assert_eq!(outcome, ConditionOutcome::Deleted);
    assert!(harness.store.children().is_empty());
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_finalizer() {
    let harness = Harness::new();
    let policy_id = harness
        .remote
        .seed_policy("Checkout alerts", IncidentPreference::PerPolicy);
    let key = put_child(&harness, "errors", nrql("errors", "5").spec, Some(policy_id));
    reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect("first pass");
    harness
        .remote
        .fail("delete_nrql_condition", Failure::ServerError);

    harness
        .store
        .delete_condition(ConditionKind::Nrql, &key)
        .await
        .expect("delete marks the child");
    let error = reconcile_condition(&harness.reconciler, ConditionKind::Nrql, &key)
        .await
        .expect_err("remote delete fails");

    assert!(matches!(error, ReconcilerError::RemoteDelete { .. }));
    assert_eq!(harness.store.deleting_children().len(), 1);
}

#[tokio::test]
async fn test_absent_child_is_a_no_op() {
    let harness = Harness::new();
    let outcome = reconcile_condition(
        &harness.reconciler,
        ConditionKind::Apm,
        &ResourceKey::new(NAMESPACE, "missing"),
    )
    .await
    .expect("absent is fine");
    assert_eq!(outcome, ConditionOutcome::Absent);
}
