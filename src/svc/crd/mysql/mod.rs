//! # MySql custom resource
//!
//! This module provide the mysql custom resource, its definition and the
//! handler reacting to its lifecycle notifications.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::svc::{
    cfg::Configuration,
    k8s::{resource, store::Store, Handler},
};

pub mod provision;
pub mod status;
pub mod teardown;
pub mod template;

// -----------------------------------------------------------------------------
// MySqlSpec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[kube(group = "volc.cyhw.io")]
#[kube(version = "v1alpha1")]
#[kube(kind = "MySQL")]
#[kube(struct = "MySql")]
#[kube(singular = "mysql")]
#[kube(plural = "mysqls")]
#[kube(shortname = "my")]
#[kube(status = "MySqlStatus")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(
    printcolumn = r#"{"name":"version", "type":"string", "description":"Version", "jsonPath":".spec.version"}"#
)]
#[kube(
    printcolumn = r#"{"name":"message", "type":"string", "description":"Message", "jsonPath":".status.message"}"#
)]
pub struct MySqlSpec {
    #[serde(rename = "version")]
    pub version: String,
}

// -----------------------------------------------------------------------------
// MySqlStatus structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct MySqlStatus {
    #[serde(rename = "message", default)]
    pub message: String,
}

// -----------------------------------------------------------------------------
// Phase enum

#[derive(thiserror::Error, Debug)]
#[error("failed to parse phase '{0}', available options are 'Received In ADD', 'Ready' or 'Failed'")]
pub struct ParsePhaseError(String);

/// phase of the provisioning written in the status message
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum Phase {
    Received,
    Ready,
    Failed,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Received => write!(f, "Received In ADD"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Received In ADD" => Ok(Self::Received),
            "Ready" => Ok(Self::Ready),
            "Failed" => Ok(Self::Failed),
            _ => Err(ParsePhaseError(s.to_string())),
        }
    }
}

// -----------------------------------------------------------------------------
// MySql implementation

impl MySql {
    /// returns the phase written in the status, if the message is one
    /// written by the operator
    pub fn phase(&self) -> Option<Phase> {
        self.status
            .as_ref()
            .and_then(|status| status.message.parse().ok())
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.status.get_or_insert_with(MySqlStatus::default).message = phase.to_string();
    }
}

// -----------------------------------------------------------------------------
// MySqlAction enum

/// reasons of the events recorded on the custom resource
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum MySqlAction {
    UpdateStatus,
    CreateSecret,
    CreateService,
    CreateStatefulSet,
    DeleteSecret,
    DeleteService,
    Provisioned,
    ProvisionFailed,
}

impl Display for MySqlAction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UpdateStatus => write!(f, "UpdateStatus"),
            Self::CreateSecret => write!(f, "CreateSecret"),
            Self::CreateService => write!(f, "CreateService"),
            Self::CreateStatefulSet => write!(f, "CreateStatefulSet"),
            Self::DeleteSecret => write!(f, "DeleteSecret"),
            Self::DeleteService => write!(f, "DeleteService"),
            Self::Provisioned => write!(f, "Provisioned"),
            Self::ProvisionFailed => write!(f, "ProvisionFailed"),
        }
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

/// reacts to the lifecycle notifications of [`MySql`] resources
#[derive(Clone)]
pub struct Reconciler<S> {
    store: S,
    config: Arc<Configuration>,
}

impl<S> Reconciler<S>
where
    S: Store,
{
    pub fn new(store: S, config: Arc<Configuration>) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl<S> Handler<MySql> for Reconciler<S>
where
    S: Store,
{
    async fn add(&self, obj: Arc<MySql>) {
        let (namespace, name) = resource::namespaced_name(&*obj);

        info!(
            namespace = namespace,
            name = name,
            version = obj.spec.version,
            "Receive ADD notification"
        );
        match provision::provision(&self.store, &self.config.mysql, &obj).await {
            Ok(step) => {
                info!(
                    namespace = namespace,
                    name = name,
                    step = format!("{:?}", step),
                    "Provisioned mysql instance"
                );
            }
            Err(err) => {
                error!(
                    namespace = namespace,
                    name = name,
                    error = err.to_string(),
                    "Failed to provision mysql instance"
                );
            }
        }
    }

    async fn update(&self, old: Arc<MySql>, new: Arc<MySql>) {
        info!(
            namespace = old.namespace().unwrap_or_default(),
            name = old.name_any(),
            version = old.spec.version,
            phase = old.phase().map(|phase| phase.to_string()).unwrap_or_default(),
            "Receive UPDATE notification, old object"
        );
        info!(
            namespace = new.namespace().unwrap_or_default(),
            name = new.name_any(),
            version = new.spec.version,
            phase = new.phase().map(|phase| phase.to_string()).unwrap_or_default(),
            "Receive UPDATE notification, new object"
        );
    }

    async fn delete(&self, obj: Arc<MySql>) {
        let (namespace, name) = resource::namespaced_name(&*obj);

        info!(
            namespace = namespace,
            name = name,
            version = obj.spec.version,
            "Receive DELETE notification"
        );
        let failures = teardown::teardown(&self.store, &self.config.mysql, &obj).await;
        if failures != 0 {
            error!(
                namespace = namespace,
                name = name,
                failures = failures,
                "Failed to delete some resources of mysql instance"
            );
        }
    }
}

// -----------------------------------------------------------------------------
// Helpers for tests

#[cfg(test)]
pub mod testing {
    use kube::api::ObjectMeta;

    use super::{MySql, MySqlSpec};

    pub fn mysql(namespace: &str, name: &str, version: &str) -> MySql {
        let mut obj = MySql::new(
            name,
            MySqlSpec {
                version: version.to_string(),
            },
        );

        obj.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        };

        obj
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{testing::mysql, Phase, Reconciler};
    use crate::svc::{
        cfg::Configuration,
        k8s::{
            store::testing::{RecordingStore, Verb},
            Handler,
        },
    };

    #[test]
    fn phase_round_trips_through_status_message() {
        let mut obj = mysql("default", "db1", "8.0");
        assert_eq!(obj.phase(), None);

        obj.set_phase(Phase::Received);
        assert_eq!(
            obj.status.as_ref().map(|s| s.message.as_str()),
            Some("Received In ADD")
        );
        assert_eq!(obj.phase(), Some(Phase::Received));

        obj.set_phase(Phase::Failed);
        assert_eq!(obj.phase(), Some(Phase::Failed));
    }

    #[test]
    fn unknown_status_message_has_no_phase() {
        let mut obj = mysql("default", "db1", "8.0");
        obj.status = Some(super::MySqlStatus {
            message: "Received".to_string(),
        });

        assert_eq!(obj.phase(), None);
    }

    #[tokio::test]
    async fn update_is_a_no_op() {
        let store = RecordingStore::default();
        let reconciler = Reconciler::new(store.to_owned(), Arc::new(Configuration::default()));

        let old = mysql("default", "db1", "5.7");
        let new = mysql("default", "db1", "8.0");
        reconciler.update(Arc::new(old), Arc::new(new)).await;

        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn add_then_delete_issues_create_then_delete_calls() {
        let store = RecordingStore::default();
        let reconciler = Reconciler::new(store.to_owned(), Arc::new(Configuration::default()));
        let obj = Arc::new(mysql("default", "db1", "8.0"));

        reconciler.add(obj.to_owned()).await;
        reconciler.delete(obj).await;

        let verbs: Vec<_> = store.calls().into_iter().map(|call| call.verb).collect();
        assert_eq!(
            verbs,
            vec![
                Verb::Status,
                Verb::Create,
                Verb::Create,
                Verb::Create,
                Verb::Status,
                Verb::Delete,
                Verb::Delete,
                Verb::Delete,
                Verb::Delete,
            ]
        );
    }
}
