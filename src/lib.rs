//! iam-operator library crate
//!
//! This module exports the aggregation controllers, CRD definitions, and the
//! health/metrics server.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube::runtime::controller::{self as runtime_controller, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::client::KubeApiClient;
use controller::context::Context;
use controller::error::Error;
use controller::role_reconciler;
use controller::role_template_reconciler;
use controller::rule_owner::AggregatingRole;
use crd::{ClusterRole, GlobalRole, Role, RoleTemplate, WorkspaceRole};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all controllers.
///
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Log the outcome of a single controller run item.
///
/// NotFound errors are expected after deletion when a template watch event
/// triggers a reconcile for a role that is already gone, so they are logged
/// at debug level.
fn log_result<K>(
    kind: &str,
    result: Result<(ObjectRef<K>, Action), runtime_controller::Error<Error, watcher::Error>>,
) where
    K: Resource<DynamicType = ()>,
{
    match result {
        Ok((obj, _action)) => {
            debug!(kind = %kind, name = %obj.name, "Reconciled");
        }
        Err(e) => {
            let is_not_found = match &e {
                runtime_controller::Error::ObjectNotFound(_) => true,
                runtime_controller::Error::ReconcilerFailed(err, _) => err.is_not_found(),
                _ => false,
            };
            if is_not_found {
                debug!(kind = %kind, "Object no longer exists (likely deleted): {:?}", e);
            } else {
                error!(kind = %kind, "Reconciliation error: {:?}", e);
            }
        }
    }
}

/// Run the role controller for kind `K`.
///
/// Roles are reconciled on their own changes and whenever a RoleTemplate
/// they list in `templateNames` changes.
async fn run_role_controller<K>(
    api: Api<K>,
    templates: Api<RoleTemplate>,
    ctx: Arc<Context>,
    concurrency: u16,
) where
    K: AggregatingRole,
{
    let (reader, stream) = create_filtered_stream(api, default_watcher_config());
    run_role_controller_from_stream(reader, stream, templates, ctx, concurrency).await
}

async fn run_role_controller_from_stream<K>(
    reader: reflector::Store<K>,
    stream: impl Stream<Item = Result<K, watcher::Error>> + Send + 'static,
    templates: Api<RoleTemplate>,
    ctx: Arc<Context>,
    concurrency: u16,
) where
    K: AggregatingRole,
{
    let kind = K::KIND.as_str();
    info!(kind = %kind, "Starting role controller");

    let owners = reader.clone();
    let template_mapper = move |template: RoleTemplate| {
        let template_name = template.name_any();
        owners
            .state()
            .into_iter()
            .filter(|role| role.references_template(&template_name))
            .map(|role| ObjectRef::from_obj(role.as_ref()))
            .collect::<Vec<_>>()
    };

    Controller::for_stream(stream, reader)
        .with_config(runtime_controller::Config::default().concurrency(concurrency))
        .watches(templates, default_watcher_config(), template_mapper)
        .run(
            role_reconciler::reconcile::<K>,
            role_reconciler::error_policy::<K>,
            ctx,
        )
        .for_each(|result| async move { log_result(kind, result) })
        .await;

    error!(kind = %kind, "Controller stream ended unexpectedly");
}

/// Run the RoleTemplate controller pushing templates into GlobalRoles.
async fn run_role_template_controller(
    templates: Api<RoleTemplate>,
    ctx: Arc<Context>,
    concurrency: u16,
) {
    info!(kind = "RoleTemplate", "Starting role template controller");

    Controller::new(templates, default_watcher_config())
        .with_config(runtime_controller::Config::default().concurrency(concurrency))
        .run(
            role_template_reconciler::reconcile,
            role_template_reconciler::error_policy,
            ctx,
        )
        .for_each(|result| async move { log_result("RoleTemplate", result) })
        .await;

    error!(kind = "RoleTemplate", "Controller stream ended unexpectedly");
}

/// Run every aggregation controller until they stop.
///
/// The GlobalRole informer cache is shared between the GlobalRole
/// controller and the auto-aggregate lookup used by the RoleTemplate
/// controller. Namespaced Roles are watched in `config.watch_namespace`,
/// or in all namespaces when unset.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controllers(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: &OperatorConfig,
) {
    let scope_msg = config.watch_namespace.as_deref().unwrap_or("cluster-wide");
    info!(
        concurrency = config.max_concurrent_reconciles,
        "Starting aggregation controllers (role scope: {})", scope_msg
    );

    let watcher_config = default_watcher_config();
    let (global_role_reader, global_role_stream) = create_filtered_stream(
        Api::<GlobalRole>::all(client.clone()),
        watcher_config,
    );

    let kube_client = KubeApiClient::new(
        client.clone(),
        config.pod_name.clone(),
        Some(global_role_reader.clone()),
    );
    let ctx = Arc::new(Context::new(
        Arc::new(kube_client),
        config.max_retries,
        health_state.clone(),
    ));

    // Mark as ready once we start the controllers
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let templates: Api<RoleTemplate> = Api::all(client.clone());
    let concurrency = config.max_concurrent_reconciles;

    tokio::join!(
        run_role_controller_from_stream(
            global_role_reader,
            global_role_stream,
            templates.clone(),
            ctx.clone(),
            concurrency,
        ),
        run_role_controller::<ClusterRole>(
            Api::all(client.clone()),
            templates.clone(),
            ctx.clone(),
            concurrency,
        ),
        run_role_controller::<WorkspaceRole>(
            Api::all(client.clone()),
            templates.clone(),
            ctx.clone(),
            concurrency,
        ),
        run_role_controller::<Role>(
            scoped_api(client.clone(), config.watch_namespace.as_deref()),
            templates.clone(),
            ctx.clone(),
            concurrency,
        ),
        run_role_template_controller(templates, ctx, concurrency),
    );
}
