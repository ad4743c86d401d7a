//! # Teardown module
//!
//! This module provide the teardown run on DELETE notifications. Every
//! deletion is attempted whatever happened to the previous ones, and nothing
//! waits for the api server to actually remove the resources.

use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{Secret, Service},
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tracing::{debug, error, info};

use crate::svc::{
    cfg,
    crd::mysql::{template, MySql},
    k8s::{
        resource::{self, Namespaced},
        store::Store,
    },
};

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static TEARDOWN_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_teardown_failed",
            "number of resources that could not be deleted on teardown"
        ),
        &["namespace", "kind"]
    )
    .expect("metrics 'kubernetes_operator_teardown_failed' to not be already registered")
});

// -----------------------------------------------------------------------------
// teardown function

/// delete the custom resource, the secret, the service and the statefulset of
/// the given mysql instance and returns the number of failed deletions
pub async fn teardown<S>(store: &S, config: &cfg::MySql, obj: &MySql) -> usize
where
    S: Store,
{
    let (namespace, name) = resource::namespaced_name(obj);

    // The custom resource is usually already gone when the notification is
    // received, a not found answer is expected.
    let results = [
        delete::<S, MySql>(store, &namespace, &name).await,
        delete::<S, Secret>(store, &namespace, &template::secret_name(obj, config)).await,
        delete::<S, Service>(store, &namespace, &template::service_name(obj, config)).await,
        delete::<S, StatefulSet>(store, &namespace, &template::stateful_set_name(obj, config))
            .await,
    ];

    results.iter().filter(|deleted| !**deleted).count()
}

/// delete the resource and returns if it succeeded, a not found answer is
/// considered as a success
async fn delete<S, T>(store: &S, namespace: &str, name: &str) -> bool
where
    S: Store,
    T: Namespaced,
{
    let kind = resource::kind::<T>();

    info!(kind = kind, namespace = namespace, name = name, "Delete resource");
    match store.delete::<T>(namespace, name).await {
        Ok(()) => true,
        Err(err) if err.is_not_found() => {
            debug!(kind = kind, namespace = namespace, name = name, "Resource is already deleted");
            true
        }
        Err(err) => {
            error!(
                kind = kind,
                namespace = namespace,
                name = name,
                error = err.to_string(),
                "Failed to delete resource"
            );
            #[cfg(feature = "metrics")]
            TEARDOWN_FAILED.with_label_values(&[namespace, &kind]).inc();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::teardown;
    use crate::svc::{
        cfg::{Configuration, Naming},
        crd::mysql::testing::mysql,
        k8s::store::testing::{RecordingStore, Verb},
    };

    fn delete(kind: &str, name: &str) -> (Verb, String, String) {
        (Verb::Delete, kind.to_string(), name.to_string())
    }

    #[tokio::test]
    async fn deletes_everything_in_order() {
        let store = RecordingStore::default();
        let config = Configuration::default().mysql;

        let failures = teardown(&store, &config, &mysql("default", "db1", "8.0")).await;

        assert_eq!(failures, 0);
        assert_eq!(
            store.summary(),
            vec![
                delete("MySQL", "db1"),
                delete("Secret", "mysql-password"),
                delete("Service", "mysql"),
                delete("StatefulSet", "db1-deployment"),
            ]
        );
        assert!(store.calls().iter().all(|call| call.namespace == "default"));
    }

    #[tokio::test]
    async fn failures_do_not_stop_teardown() {
        let store = RecordingStore::default()
            .fail(Verb::Delete, "MySQL")
            .fail(Verb::Delete, "Secret")
            .fail(Verb::Delete, "Service");
        let config = Configuration::default().mysql;

        let failures = teardown(&store, &config, &mysql("default", "db1", "8.0")).await;

        assert_eq!(failures, 3);
        assert_eq!(store.summary().len(), 4);
        assert_eq!(store.summary()[3], delete("StatefulSet", "db1-deployment"));
    }

    #[tokio::test]
    async fn derived_names_are_deleted() {
        let store = RecordingStore::default();
        let mut config = Configuration::default().mysql;
        config.naming = Naming::Derived;

        teardown(&store, &config, &mysql("default", "db1", "8.0")).await;

        assert_eq!(store.summary()[1], delete("Secret", "db1-mysql-password"));
        assert_eq!(store.summary()[2], delete("Service", "db1-mysql"));
    }
}
