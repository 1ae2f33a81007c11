//! Kubernetes API access used by the controllers.
//!
//! `KubeClient` is the seam between reconcile logic and the cluster. The
//! production implementation talks to the API server through `kube::Api`
//! and serves the auto-aggregate lookup from the GlobalRole informer cache;
//! tests substitute an in-memory implementation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{ListParams, PostParams};
use kube::core::Selector;
use kube::runtime::events::{Event, Recorder, Reporter};
use kube::runtime::reflector::Store;
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::controller::rule_owner::{OwnerKind, RuleOwner};
use crate::crd::{
    AUTO_AGGREGATE_ANNOTATION, ClusterRole, GlobalRole, Role, RoleTemplate, WorkspaceRole,
};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "iam-operator";

/// Operations the aggregation controllers need from the cluster.
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a role of the given kind; `None` when it does not exist.
    async fn get_owner(
        &self,
        kind: OwnerKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<RuleOwner>>;

    /// Replace a role. The write carries the object's resourceVersion, so a
    /// concurrent modification surfaces as a 409 conflict.
    async fn update_owner(&self, owner: &RuleOwner) -> Result<RuleOwner>;

    /// Fetch a RoleTemplate by name; `None` when it does not exist.
    async fn get_role_template(&self, name: &str) -> Result<Option<RoleTemplate>>;

    /// List RoleTemplates matching a label selector.
    async fn list_role_templates(&self, selector: &Selector) -> Result<Vec<RoleTemplate>>;

    /// GlobalRoles annotated for automatic aggregation of new templates.
    async fn list_auto_aggregate_global_roles(&self) -> Result<Vec<GlobalRole>>;

    /// Record an event against an object.
    async fn publish_event(&self, reference: &ObjectReference, event: &Event) -> Result<()>;
}

/// Whether a GlobalRole opted into automatic aggregation.
pub fn is_auto_aggregate(role: &GlobalRole) -> bool {
    role.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(AUTO_AGGREGATE_ANNOTATION))
        .is_some_and(|v| v == "true")
}

/// `KubeClient` backed by the Kubernetes API server.
pub struct KubeApiClient {
    client: Client,
    reporter: Reporter,
    global_roles: Option<Store<GlobalRole>>,
}

impl KubeApiClient {
    /// Create a client with event reporter identity `instance`.
    ///
    /// `global_roles` is the GlobalRole reflector store; without it the
    /// auto-aggregate lookup falls back to a list call.
    pub fn new(
        client: Client,
        instance: Option<String>,
        global_roles: Option<Store<GlobalRole>>,
    ) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance,
            },
            global_roles,
        }
    }

    fn cluster_api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    fn role_api(&self, namespace: Option<&str>) -> Result<Api<Role>> {
        let namespace =
            namespace.ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    Ok(api.get_opt(name).await?)
}

async fn replace<K>(api: Api<K>, obj: &K) -> Result<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    };
    Ok(api.replace(&name, &params, obj).await?)
}

#[async_trait]
impl KubeClient for KubeApiClient {
    async fn get_owner(
        &self,
        kind: OwnerKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<RuleOwner>> {
        let owner = match kind {
            OwnerKind::GlobalRole => get_opt::<GlobalRole>(self.cluster_api(), name)
                .await?
                .map(RuleOwner::from),
            OwnerKind::ClusterRole => get_opt::<ClusterRole>(self.cluster_api(), name)
                .await?
                .map(RuleOwner::from),
            OwnerKind::Role => get_opt(self.role_api(namespace)?, name)
                .await?
                .map(RuleOwner::from),
            OwnerKind::WorkspaceRole => get_opt::<WorkspaceRole>(self.cluster_api(), name)
                .await?
                .map(RuleOwner::from),
        };
        Ok(owner)
    }

    async fn update_owner(&self, owner: &RuleOwner) -> Result<RuleOwner> {
        let updated: RuleOwner = match owner {
            RuleOwner::GlobalRole(r) => replace(self.cluster_api(), r).await?.into(),
            RuleOwner::ClusterRole(r) => replace(self.cluster_api(), r).await?.into(),
            RuleOwner::Role(r) => {
                let api = self.role_api(owner.namespace().as_deref())?;
                replace(api, r).await?.into()
            }
            RuleOwner::WorkspaceRole(r) => replace(self.cluster_api(), r).await?.into(),
        };
        Ok(updated)
    }

    async fn get_role_template(&self, name: &str) -> Result<Option<RoleTemplate>> {
        get_opt::<RoleTemplate>(self.cluster_api(), name).await
    }

    async fn list_role_templates(&self, selector: &Selector) -> Result<Vec<RoleTemplate>> {
        let api: Api<RoleTemplate> = self.cluster_api();
        let list = api
            .list(&ListParams::default().labels_from(selector))
            .await?;
        Ok(list.items)
    }

    async fn list_auto_aggregate_global_roles(&self) -> Result<Vec<GlobalRole>> {
        match &self.global_roles {
            Some(store) => {
                store
                    .wait_until_ready()
                    .await
                    .map_err(|e| Error::CacheUnavailable(e.to_string()))?;
                Ok(store
                    .state()
                    .into_iter()
                    .filter(|role| is_auto_aggregate(role))
                    .map(|role| role.as_ref().clone())
                    .collect())
            }
            None => {
                debug!("GlobalRole cache not wired, listing from API server");
                let api: Api<GlobalRole> = self.cluster_api();
                let list = api.list(&ListParams::default()).await?;
                Ok(list.items.into_iter().filter(is_auto_aggregate).collect())
            }
        }
    }

    async fn publish_event(&self, reference: &ObjectReference, event: &Event) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        recorder.publish(event, reference).await?;
        Ok(())
    }
}
