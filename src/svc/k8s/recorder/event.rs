//! # Event module
//!
//! This module provide helpers to build kubernetes core/v1/event objects

use chrono::Utc;
use k8s_openapi::{
    api::core::v1::{Event, EventSource},
    apimachinery::pkg::apis::meta::v1::{MicroTime, Time},
};
use kube::{api::ObjectMeta, Resource, ResourceExt};

use crate::svc::k8s::{recorder::Level, resource};

// -----------------------------------------------------------------------------
// Helper functions

/// create a new event from the given parameters, the name is generated by
/// the api server from the name of the object and the action
pub fn new<T>(obj: &T, level: Level, action: &str, message: &str) -> Event
where
    T: Resource<DynamicType = ()>,
{
    let now = Utc::now();

    Event {
        metadata: ObjectMeta {
            namespace: obj.namespace(),
            generate_name: Some(format!("{}-{}-", obj.name_any(), action.to_lowercase())),
            ..Default::default()
        },
        type_: Some(level.to_string()),
        action: Some(action.to_string()),
        count: Some(1),
        event_time: Some(MicroTime(now)),
        first_timestamp: Some(Time(now)),
        involved_object: resource::object_reference(obj),
        last_timestamp: Some(Time(now)),
        message: Some(message.to_string()),
        reason: Some(action.to_string()),
        reporting_component: Some(env!("CARGO_PKG_NAME").to_string()),
        reporting_instance: Some(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )),
        series: None,
        source: Some(source()),
        ..Default::default()
    }
}

/// returns the source of this operator
pub fn source() -> EventSource {
    let host = hostname::get()
        .ok()
        .map(|host| host.to_string_lossy().to_string());

    EventSource {
        component: Some(env!("CARGO_PKG_NAME").to_string()),
        host,
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    use super::new;
    use crate::svc::k8s::recorder::Level;

    #[test]
    fn events_of_the_same_action_do_not_share_a_name() {
        let obj = Secret {
            metadata: ObjectMeta {
                name: Some("mysql-password".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let first = new(&obj, Level::Normal, "CreateSecret", "Create secret");
        let second = new(&obj, Level::Normal, "CreateSecret", "Create secret");

        assert_eq!(first.metadata.name, None);
        assert_eq!(second.metadata.name, None);
        assert_eq!(
            first.metadata.generate_name.as_deref(),
            Some("mysql-password-createsecret-")
        );
        assert_eq!(first.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(first.involved_object.name.as_deref(), Some("mysql-password"));
        assert_eq!(first.type_.as_deref(), Some("Normal"));
    }
}
