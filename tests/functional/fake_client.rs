//! In-memory cluster for functional tests.
//!
//! `FakeClient` implements `KubeClient` over plain maps. Writes enforce
//! resourceVersion the way the API server does, so conflict handling can be
//! exercised, and every update and event is recorded for assertions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{ErrorResponse, Selector, SelectorExt};
use kube::runtime::events::{Event, EventType};
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;

use iam_operator::controller::client::{KubeClient, is_auto_aggregate};
use iam_operator::controller::error::{Error, Result};
use iam_operator::controller::rule_owner::{OwnerKind, RuleOwner};
use iam_operator::crd::{GlobalRole, RoleTemplate};

/// An event captured by the fake.
#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Build an API error with the given HTTP status.
pub fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

fn owner_key(kind: OwnerKind, namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace.unwrap_or_default(), name)
}

fn meta_mut(owner: &mut RuleOwner) -> &mut ObjectMeta {
    match owner {
        RuleOwner::GlobalRole(r) => r.meta_mut(),
        RuleOwner::ClusterRole(r) => r.meta_mut(),
        RuleOwner::Role(r) => r.meta_mut(),
        RuleOwner::WorkspaceRole(r) => r.meta_mut(),
    }
}

#[derive(Default)]
pub struct FakeClient {
    owners: Mutex<BTreeMap<String, RuleOwner>>,
    templates: Mutex<BTreeMap<String, RoleTemplate>>,
    updates: Mutex<Vec<RuleOwner>>,
    events: Mutex<Vec<RecordedEvent>>,
    fail_updates: Mutex<Option<u16>>,
    fail_template_reads: Mutex<Option<u16>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a role, assigning resourceVersion "1".
    pub fn insert_owner(&self, owner: impl Into<RuleOwner>) {
        let mut owner = owner.into();
        meta_mut(&mut owner).resource_version = Some("1".to_string());
        let key = owner_key(owner.kind(), owner.namespace().as_deref(), &owner.name());
        self.owners.lock().insert(key, owner);
    }

    pub fn insert_template(&self, template: RoleTemplate) {
        self.templates.lock().insert(template.name_any(), template);
    }

    /// Current stored copy of a role.
    pub fn owner(&self, kind: OwnerKind, namespace: Option<&str>, name: &str) -> RuleOwner {
        self.owners
            .lock()
            .get(&owner_key(kind, namespace, name))
            .cloned()
            .unwrap_or_else(|| panic!("no {kind} {name}"))
    }

    /// Simulate a concurrent writer bumping a role's resourceVersion.
    pub fn touch_owner(&self, kind: OwnerKind, namespace: Option<&str>, name: &str) {
        let mut owners = self.owners.lock();
        let owner = owners
            .get_mut(&owner_key(kind, namespace, name))
            .unwrap_or_else(|| panic!("no {kind} {name}"));
        let meta = meta_mut(owner);
        let next = meta
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        meta.resource_version = Some(next.to_string());
    }

    /// Make every subsequent update fail with `code`.
    pub fn fail_updates_with(&self, code: u16) {
        *self.fail_updates.lock() = Some(code);
    }

    /// Make every subsequent template read fail with `code`.
    pub fn fail_template_reads_with(&self, code: u16) {
        *self.fail_template_reads.lock() = Some(code);
    }

    pub fn clear_failures(&self) {
        *self.fail_updates.lock() = None;
        *self.fail_template_reads.lock() = None;
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn normal_events(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| !e.warning).collect()
    }

    pub fn warning_events(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.warning).collect()
    }

    fn template_read_failure(&self) -> Result<()> {
        match *self.fail_template_reads.lock() {
            Some(code) => Err(api_error(code, "TemplateReadFailed")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KubeClient for FakeClient {
    async fn get_owner(
        &self,
        kind: OwnerKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<RuleOwner>> {
        Ok(self
            .owners
            .lock()
            .get(&owner_key(kind, namespace, name))
            .cloned())
    }

    async fn update_owner(&self, owner: &RuleOwner) -> Result<RuleOwner> {
        if let Some(code) = *self.fail_updates.lock() {
            return Err(api_error(code, "UpdateFailed"));
        }

        let key = owner_key(owner.kind(), owner.namespace().as_deref(), &owner.name());
        let mut owners = self.owners.lock();
        let stored = owners
            .get(&key)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.resource_version() != owner.resource_version() {
            return Err(api_error(409, "Conflict"));
        }

        let mut written = owner.clone();
        let next = owner
            .resource_version()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        meta_mut(&mut written).resource_version = Some(next.to_string());
        owners.insert(key, written.clone());
        self.updates.lock().push(written.clone());
        Ok(written)
    }

    async fn get_role_template(&self, name: &str) -> Result<Option<RoleTemplate>> {
        self.template_read_failure()?;
        Ok(self.templates.lock().get(name).cloned())
    }

    async fn list_role_templates(&self, selector: &Selector) -> Result<Vec<RoleTemplate>> {
        self.template_read_failure()?;
        Ok(self
            .templates
            .lock()
            .values()
            .filter(|t| selector.matches(t.labels()))
            .cloned()
            .collect())
    }

    async fn list_auto_aggregate_global_roles(&self) -> Result<Vec<GlobalRole>> {
        Ok(self
            .owners
            .lock()
            .values()
            .filter_map(|owner| match owner {
                RuleOwner::GlobalRole(role) if is_auto_aggregate(role) => Some(role.clone()),
                _ => None,
            })
            .collect())
    }

    async fn publish_event(&self, reference: &ObjectReference, event: &Event) -> Result<()> {
        self.events.lock().push(RecordedEvent {
            object: reference.name.clone().unwrap_or_default(),
            warning: matches!(event.type_, EventType::Warning),
            reason: event.reason.clone(),
            action: event.action.clone(),
            note: event.note.clone(),
        });
        Ok(())
    }
}
