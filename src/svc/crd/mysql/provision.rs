//! # Provision module
//!
//! This module provide the provisioning engine run on ADD notifications. It
//! creates the secret, the service and the statefulset in this order, and
//! deletes what it created in reverse order when a step fails.
//!
//! The engine is not idempotent: a notification delivered twice for the same
//! object fails on the already existing secret. Handlers for different objects
//! sharing the same secret or service name are not serialized either.

use std::fmt::{self, Display, Formatter};

use k8s_openapi::api::core::v1::{Secret, Service};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tracing::{error, info, warn};

use crate::svc::{
    cfg,
    crd::mysql::{status::Reporter, template, MySql, MySqlAction, Phase},
    k8s::{
        recorder,
        resource::{self, Namespaced},
        store::{self, Store},
    },
};

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static PROVISION_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_provision_success",
            "number of successful provisioning"
        ),
        &["namespace"]
    )
    .expect("metrics 'kubernetes_operator_provision_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static PROVISION_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_provision_failed",
            "number of failed provisioning"
        ),
        &["namespace", "step"]
    )
    .expect("metrics 'kubernetes_operator_provision_failed' to not be already registered")
});

#[cfg(feature = "metrics")]
static COMPENSATION_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_compensation_failed",
            "number of resources that could not be deleted during a rollback"
        ),
        &["namespace", "kind"]
    )
    .expect("metrics 'kubernetes_operator_compensation_failed' to not be already registered")
});

// -----------------------------------------------------------------------------
// Step enum

/// last step reached by the provisioning engine
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum Step {
    StatusUpdated,
    SecretCreated,
    ServiceCreated,
    WorkloadCreated,
    Done,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::StatusUpdated => write!(f, "StatusUpdated"),
            Self::SecretCreated => write!(f, "SecretCreated"),
            Self::ServiceCreated => write!(f, "ServiceCreated"),
            Self::WorkloadCreated => write!(f, "WorkloadCreated"),
            Self::Done => write!(f, "Done"),
        }
    }
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to update status of custom resource, {0}")]
    Status(store::Error),
    #[error("failed to create secret '{0}', {1}")]
    Secret(String, store::Error),
    #[error("failed to create service '{0}', {1}")]
    Service(String, store::Error),
    #[error("failed to create statefulset '{0}', {1}")]
    StatefulSet(String, store::Error),
}

impl Error {
    /// returns the step reached before the failure
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Status(_) => None,
            Self::Secret(_, _) => Some(Step::StatusUpdated),
            Self::Service(_, _) => Some(Step::SecretCreated),
            Self::StatefulSet(_, _) => Some(Step::ServiceCreated),
        }
    }

    /// returns the name of the step reached before the failure, 'Started' if
    /// none was
    pub fn reached(&self) -> String {
        self.step()
            .map(|step| step.to_string())
            .unwrap_or_else(|| "Started".to_string())
    }
}

// -----------------------------------------------------------------------------
// Created enum

/// resource created by the current provisioning, to delete on rollback
#[derive(PartialEq, Eq, Clone, Debug)]
enum Created {
    Secret(String),
    Service(String),
}

// -----------------------------------------------------------------------------
// provision function

/// create the resources of the given mysql instance and returns the last
/// reached step, on failure the created resources are deleted in reverse
/// order before returning the error
pub async fn provision<S>(store: &S, config: &cfg::MySql, origin: &MySql) -> Result<Step, Error>
where
    S: Store,
{
    let (namespace, name) = resource::namespaced_name(origin);
    let mut reporter = Reporter::from(origin.to_owned());
    let mut created = vec![];

    // -------------------------------------------------------------------------
    // Step 1: acknowledge the notification in the status

    reporter
        .report(store, Phase::Received)
        .await
        .map_err(Error::Status)?;

    info!(
        namespace = namespace,
        name = name,
        version = origin.spec.version,
        "Update status of custom resource"
    );
    let action = &MySqlAction::UpdateStatus;
    let message = &format!("Update status to '{}'", Phase::Received);
    recorder::normal(store, reporter.current(), action, message).await;

    // -------------------------------------------------------------------------
    // Step 2: create the secret

    let secret = template::secret(origin, config);
    let secret_name = template::secret_name(origin, config);

    info!(
        namespace = namespace,
        name = name,
        secret = secret_name,
        "Create secret for custom resource"
    );
    if let Err(err) = store.create(&secret).await {
        let err = Error::Secret(secret_name, err);
        fail(store, &mut reporter, &created, &err).await;
        return Err(err);
    }

    created.push(Created::Secret(secret_name.to_owned()));
    let action = &MySqlAction::CreateSecret;
    let message = &format!("Create secret '{}'", secret_name);
    recorder::normal(store, reporter.current(), action, message).await;

    // -------------------------------------------------------------------------
    // Step 3: create the headless service

    let service = template::service(origin, config);
    let service_name = template::service_name(origin, config);

    info!(
        namespace = namespace,
        name = name,
        service = service_name,
        "Create service for custom resource"
    );
    if let Err(err) = store.create(&service).await {
        let err = Error::Service(service_name, err);
        fail(store, &mut reporter, &created, &err).await;
        return Err(err);
    }

    created.push(Created::Service(service_name.to_owned()));
    let action = &MySqlAction::CreateService;
    let message = &format!("Create service '{}'", service_name);
    recorder::normal(store, reporter.current(), action, message).await;

    // -------------------------------------------------------------------------
    // Step 4: create the statefulset

    let sts = template::stateful_set(origin, config);
    let sts_name = template::stateful_set_name(origin, config);

    info!(
        namespace = namespace,
        name = name,
        statefulset = sts_name,
        "Create statefulset for custom resource"
    );
    if let Err(err) = store.create(&sts).await {
        let err = Error::StatefulSet(sts_name, err);
        fail(store, &mut reporter, &created, &err).await;
        return Err(err);
    }

    let action = &MySqlAction::CreateStatefulSet;
    let message = &format!("Create statefulset '{}'", sts_name);
    recorder::normal(store, reporter.current(), action, message).await;

    // -------------------------------------------------------------------------
    // Step 5: mark the instance as ready

    #[cfg(feature = "metrics")]
    PROVISION_SUCCESS.with_label_values(&[&namespace]).inc();

    let action = &MySqlAction::Provisioned;
    let message = "Provision secret, service and statefulset";
    recorder::normal(store, reporter.current(), action, message).await;

    // resources are there, a failure only leaves the status behind
    if let Err(err) = reporter.report(store, Phase::Ready).await {
        warn!(
            namespace = namespace,
            name = name,
            error = err.to_string(),
            "Failed to update status of custom resource"
        );
        return Ok(Step::WorkloadCreated);
    }

    Ok(Step::Done)
}

/// mark the custom resource as failed and delete the created resources in
/// reverse order, every error is logged and swallowed
async fn fail<S>(store: &S, reporter: &mut Reporter, created: &[Created], err: &Error)
where
    S: Store,
{
    let (namespace, name) = resource::namespaced_name(reporter.current());

    error!(
        namespace = namespace,
        name = name,
        error = err.to_string(),
        "Failed to provision resources of custom resource"
    );
    #[cfg(feature = "metrics")]
    PROVISION_FAILED
        .with_label_values(&[&namespace, &err.reached()])
        .inc();

    if let Err(err) = reporter.report(store, Phase::Failed).await {
        error!(
            namespace = namespace,
            name = name,
            error = err.to_string(),
            "Failed to update status of custom resource"
        );
    }

    let action = &MySqlAction::ProvisionFailed;
    recorder::warning(store, reporter.current(), action, &err.to_string()).await;

    for resource in created.iter().rev() {
        match resource {
            Created::Service(service) => {
                let action = &MySqlAction::DeleteService;
                compensate::<S, Service>(store, reporter.current(), service, action).await
            }
            Created::Secret(secret) => {
                let action = &MySqlAction::DeleteSecret;
                compensate::<S, Secret>(store, reporter.current(), secret, action).await
            }
        }
    }
}

/// delete a resource created by the current provisioning, a failure is
/// recorded as a warning event on the custom resource as the resource leaks
async fn compensate<S, T>(store: &S, obj: &MySql, target: &str, action: &MySqlAction)
where
    S: Store,
    T: Namespaced,
{
    let (namespace, name) = resource::namespaced_name(obj);
    let kind = resource::kind::<T>();

    info!(
        namespace = namespace,
        name = name,
        kind = kind,
        target = target,
        "Delete resource created for custom resource"
    );
    match store.delete::<T>(&namespace, target).await {
        Ok(()) => {
            let message = &format!("Delete {} '{}'", kind.to_lowercase(), target);
            recorder::normal(store, obj, action, message).await;
        }
        Err(err) => {
            error!(
                namespace = namespace,
                name = name,
                kind = kind,
                target = target,
                error = err.to_string(),
                "Failed to delete resource created for custom resource"
            );
            #[cfg(feature = "metrics")]
            COMPENSATION_FAILED
                .with_label_values(&[&namespace, &kind])
                .inc();

            let message = &format!(
                "Could not delete {} '{}', the resource is left behind, {}",
                kind.to_lowercase(),
                target,
                err
            );
            recorder::warning(store, obj, action, message).await;
        }
    }
}
