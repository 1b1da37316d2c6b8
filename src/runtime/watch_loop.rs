//! # Watch Loop
//!
//! Runs one `kube_runtime::Controller` per resource kind and restarts them
//! if their streams end without a shutdown signal.
//!
//! Each controller hands the object's `namespace/name` to the identity-based
//! reconcile entry points; the reconcilers load the object themselves.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{
    reconcile_condition, reconcile_policy, Reconciler, ReconcilerError,
};
use crate::crd::{AlertsApmCondition, AlertsNrqlCondition, AlertsPolicy, ConditionKind, ResourceKey};
use crate::observability::metrics;
use crate::runtime::error_policy::{backoff_key, handle_reconciliation_error, log_controller_result};
use crate::runtime::initialization::InitializationResult;
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

const POLICY_KIND: &str = "policy";

/// Run the controllers until a shutdown signal arrives
///
/// # Errors
/// Currently never fails; the signature leaves room for fatal startup checks
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        reconciler,
        server_state,
        controller_config,
    } = init;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_flag.store(true, Ordering::Relaxed);
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
    });

    server_state.is_ready.store(true, Ordering::Relaxed);

    loop {
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!("Starting controllers for AlertsPolicy, AlertsNrqlCondition and AlertsApmCondition...");
        futures::future::join3(
            run_policy_controller(client.clone(), Arc::clone(&reconciler), &controller_config),
            run_condition_controller::<AlertsNrqlCondition>(
                client.clone(),
                Arc::clone(&reconciler),
                ConditionKind::Nrql,
                &controller_config,
            ),
            run_condition_controller::<AlertsApmCondition>(
                client.clone(),
                Arc::clone(&reconciler),
                ConditionKind::Apm,
                &controller_config,
            ),
        )
        .instrument(watch_span)
        .await;

        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config.watch_restart_delay_duration();
        warn!(
            "Controller watch streams ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped gracefully");
    Ok(())
}

fn controller_settings(config: &ControllerConfig) -> controller::Config {
    controller::Config::default().concurrency(config.max_concurrent_reconciliations)
}

async fn run_policy_controller(
    client: Client,
    reconciler: Arc<Reconciler>,
    config: &ControllerConfig,
) {
    let policies: Api<AlertsPolicy> = Api::all(client);
    Controller::new(policies, watcher::Config::default().any_semantic())
        .with_config(controller_settings(config))
        .shutdown_on_signal()
        .run(
            |obj, ctx| {
                let key = ResourceKey::of(obj.as_ref());
                async move {
                    run_pass(&ctx, POLICY_KIND, "AlertsPolicy", key.clone(), async {
                        reconcile_policy(&ctx, &key).await
                    })
                    .await
                }
            },
            |obj, error, ctx| {
                handle_reconciliation_error(POLICY_KIND, &ResourceKey::of(obj.as_ref()), error, &ctx)
            },
            reconciler,
        )
        .for_each(|result| {
            log_controller_result("AlertsPolicy", &result);
            futures::future::ready(())
        })
        .await;
}

async fn run_condition_controller<K>(
    client: Client,
    reconciler: Arc<Reconciler>,
    kind: ConditionKind,
    config: &ControllerConfig,
) where
    K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let conditions: Api<K> = Api::all(client);
    Controller::new(conditions, watcher::Config::default().any_semantic())
        .with_config(controller_settings(config))
        .shutdown_on_signal()
        .run(
            move |obj, ctx| {
                let key = ResourceKey::of(obj.as_ref());
                async move {
                    run_pass(&ctx, kind.as_str(), kind.resource_kind(), key.clone(), async {
                        reconcile_condition(&ctx, kind, &key).await
                    })
                    .await
                }
            },
            move |obj, error, ctx| {
                handle_reconciliation_error(kind.as_str(), &ResourceKey::of(obj.as_ref()), error, &ctx)
            },
            reconciler,
        )
        .for_each(move |result| {
            log_controller_result(kind.resource_kind(), &result);
            futures::future::ready(())
        })
        .await;
}

/// Run one reconcile pass inside its span, with metrics and backoff bookkeeping
async fn run_pass<T, F>(
    ctx: &Reconciler,
    kind: &str,
    resource_kind: &str,
    key: ResourceKey,
    pass: F,
) -> Result<Action, ReconcilerError>
where
    T: Debug,
    F: Future<Output = Result<T, ReconcilerError>>,
{
    let span = tracing::info_span!(
        "reconcile",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.kind = resource_kind
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations(kind);
        let result = pass.await;
        metrics::observe_reconciliation_duration(kind, start.elapsed().as_secs_f64());

        let outcome = result?;
        if ctx.backoff.reset(&backoff_key(kind, &key)) {
            info!("{} {} recovered, backoff reset", resource_kind, key);
        }
        debug!(outcome = ?outcome, "reconciliation finished");

        Ok(ctx
            .config
            .resync_interval()
            .map_or_else(Action::await_change, Action::requeue))
    }
    .instrument(span)
    .await
}
