//! # Template module
//!
//! This module provide the builders of the resources needed to run a mysql
//! instance. Builders are pure: the same custom resource and configuration
//! always give the same objects.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
            PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, ResourceRequirements, Secret,
            SecretKeySelector, Service, ServicePort, ServiceSpec, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector},
};
use kube::{api::ObjectMeta, ResourceExt};

use crate::svc::{
    cfg::{self, Naming},
    crd::mysql::MySql,
};

// -----------------------------------------------------------------------------
// Constants

pub const INSTANCE_LABEL: &str = "mysql.volc.cyhw.io/instance";
pub const SECRET_TYPE: &str = "Opaque";
pub const HEADLESS: &str = "None";
pub const STORAGE: &str = "storage";
pub const READ_WRITE_ONCE: &str = "ReadWriteOnce";

// -----------------------------------------------------------------------------
// Names

/// returns the name of the secret holding the root password
pub fn secret_name(obj: &MySql, config: &cfg::MySql) -> String {
    match config.naming {
        Naming::Shared => config.secret_name.to_owned(),
        Naming::Derived => format!("{}-{}", obj.name_any(), config.secret_name),
    }
}

/// returns the name of the headless service
pub fn service_name(obj: &MySql, config: &cfg::MySql) -> String {
    match config.naming {
        Naming::Shared => config.service_name.to_owned(),
        Naming::Derived => format!("{}-{}", obj.name_any(), config.service_name),
    }
}

/// returns the name of the statefulset, always derived from the custom
/// resource
pub fn stateful_set_name(obj: &MySql, config: &cfg::MySql) -> String {
    format!("{}{}", obj.name_any(), config.workload_suffix)
}

/// returns the labels used to select the pods of the instance
pub fn labels(obj: &MySql, config: &cfg::MySql) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([(config.label_key.to_owned(), config.label_value.to_owned())]);

    if config.naming == Naming::Derived {
        labels.insert(INSTANCE_LABEL.to_string(), obj.name_any());
    }

    labels
}

// -----------------------------------------------------------------------------
// Builders

/// returns the secret holding the root password
pub fn secret(obj: &MySql, config: &cfg::MySql) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(secret_name(obj, config)),
            namespace: obj.namespace(),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        string_data: Some(BTreeMap::from([(
            config.env_name.to_owned(),
            config.password.to_owned(),
        )])),
        ..Default::default()
    }
}

/// returns the headless service in front of the statefulset
pub fn service(obj: &MySql, config: &cfg::MySql) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name(obj, config)),
            namespace: obj.namespace(),
            labels: Some(labels(obj, config)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(HEADLESS.to_string()),
            ports: Some(vec![ServicePort {
                port: config.container_port,
                ..Default::default()
            }]),
            selector: Some(labels(obj, config)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// returns the statefulset running the database
pub fn stateful_set(obj: &MySql, config: &cfg::MySql) -> StatefulSet {
    let container = Container {
        name: config.container_name.to_owned(),
        image: Some(format!("{}{}", config.image_prefix, obj.spec.version)),
        ports: Some(vec![ContainerPort {
            container_port: config.container_port,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: config.volume_name.to_owned(),
            mount_path: config.volume_path.to_owned(),
            ..Default::default()
        }]),
        env: Some(vec![EnvVar {
            name: config.env_name.to_owned(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(secret_name(obj, config)),
                    key: config.env_name.to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(obj, config)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(config.termination_grace_period),
            containers: vec![container],
            ..Default::default()
        }),
    };

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(config.volume_name.to_owned()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![READ_WRITE_ONCE.to_string()]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    STORAGE.to_string(),
                    Quantity(config.storage_request.to_owned()),
                )])),
                limits: Some(BTreeMap::from([(
                    STORAGE.to_string(),
                    Quantity(config.storage_limit.to_owned()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(stateful_set_name(obj, config)),
            namespace: obj.namespace(),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels(obj, config)),
                ..Default::default()
            },
            service_name: service_name(obj, config),
            replicas: Some(config.replicas),
            template,
            volume_claim_templates: Some(vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use crate::svc::{
        cfg::{Configuration, Naming},
        crd::mysql::{testing::mysql, template},
    };

    #[test]
    fn builders_are_deterministic() {
        let config = Configuration::default().mysql;
        let obj = mysql("default", "db1", "8.0");

        assert_eq!(template::secret(&obj, &config), template::secret(&obj, &config));
        assert_eq!(template::service(&obj, &config), template::service(&obj, &config));
        assert_eq!(
            serde_json::to_string(&template::stateful_set(&obj, &config)).expect("to serialize"),
            serde_json::to_string(&template::stateful_set(&obj, &config)).expect("to serialize"),
        );
    }

    #[test]
    fn secret_holds_root_password() {
        let config = Configuration::default().mysql;
        let secret = template::secret(&mysql("default", "db1", "8.0"), &config);

        assert_eq!(secret.metadata.name.as_deref(), Some("mysql-password"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret
                .string_data
                .expect("string data to be set")
                .get("MYSQL_ROOT_PASSWORD")
                .map(String::as_str),
            Some("bytedance")
        );
    }

    #[test]
    fn service_is_headless() {
        let config = Configuration::default().mysql;
        let service = template::service(&mysql("default", "db1", "8.0"), &config);
        let spec = service.spec.expect("service to have a spec");

        assert_eq!(service.metadata.name.as_deref(), Some("mysql"));
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.ports.expect("ports to be set")[0].port, 3306);

        let selector = spec.selector.expect("selector to be set");
        assert_eq!(selector.len(), 1);
        assert_eq!(selector.get("app").map(String::as_str), Some("mysql"));
    }

    #[test]
    fn stateful_set_runs_requested_version() {
        let config = Configuration::default().mysql;
        let sts = template::stateful_set(&mysql("default", "db1", "8.0"), &config);
        let spec = sts.spec.expect("statefulset to have a spec");
        let pod = spec.template.spec.expect("pod template to have a spec");
        let container = &pod.containers[0];

        assert_eq!(sts.metadata.name.as_deref(), Some("db1-deployment"));
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.service_name, "mysql");
        assert_eq!(pod.termination_grace_period_seconds, Some(10));
        assert_eq!(container.name, "mysql");
        assert_eq!(container.image.as_deref(), Some("arm64v8/mysql:8.0"));

        let mounts = container.volume_mounts.as_ref().expect("mounts to be set");
        assert_eq!(mounts[0].name, "mysql-store");
        assert_eq!(mounts[0].mount_path, "/var/lib/mysql");

        let env = &container.env.as_ref().expect("env to be set")[0];
        let selector = env
            .value_from
            .as_ref()
            .and_then(|source| source.secret_key_ref.as_ref())
            .expect("env to come from a secret");
        assert_eq!(env.name, "MYSQL_ROOT_PASSWORD");
        assert_eq!(selector.name.as_deref(), Some("mysql-password"));
        assert_eq!(selector.key, "MYSQL_ROOT_PASSWORD");

        let claims = spec.volume_claim_templates.expect("claims to be set");
        let resources = claims[0]
            .spec
            .as_ref()
            .and_then(|spec| spec.resources.as_ref())
            .expect("claim to have resources");
        assert_eq!(
            resources.requests.as_ref().and_then(|r| r.get("storage")).map(|q| q.0.as_str()),
            Some("1Gi")
        );
        assert_eq!(
            resources.limits.as_ref().and_then(|r| r.get("storage")).map(|q| q.0.as_str()),
            Some("2Gi")
        );
    }

    #[test]
    fn derived_naming_avoids_collisions() {
        let mut config = Configuration::default().mysql;
        config.naming = Naming::Derived;

        let db1 = mysql("default", "db1", "8.0");
        let db2 = mysql("default", "db2", "8.0");

        assert_ne!(template::secret_name(&db1, &config), template::secret_name(&db2, &config));
        assert_ne!(template::service_name(&db1, &config), template::service_name(&db2, &config));
        assert_eq!(template::secret_name(&db1, &config), "db1-mysql-password");
        assert_eq!(template::service_name(&db1, &config), "db1-mysql");

        let labels = template::labels(&db1, &config);
        assert_eq!(labels.get(template::INSTANCE_LABEL).map(String::as_str), Some("db1"));

        let sts = template::stateful_set(&db1, &config);
        assert_eq!(sts.spec.expect("statefulset to have a spec").service_name, "db1-mysql");
    }
}
