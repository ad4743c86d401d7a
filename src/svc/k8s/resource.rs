//! # Resource module
//!
//! This module provide helpers on kubernetes [`Resource`]

use std::fmt::Debug;

use k8s_openapi::{api::core::v1::ObjectReference, NamespaceResourceScope};
use kube::{Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};

// -----------------------------------------------------------------------------
// Namespaced trait

/// group traits needed to send a namespaced resource to the kubernetes api
pub trait Namespaced:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + DeserializeOwned
    + Serialize
    + Clone
    + Debug
    + Send
    + Sync
    + 'static
{
}

/// Blanklet implementation of [`Namespaced`]
impl<T> Namespaced for T where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + DeserializeOwned
        + Serialize
        + Clone
        + Debug
        + Send
        + Sync
        + 'static
{
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the namespace and name of the kubernetes resource, the namespace
/// is empty for cluster scoped resources
pub fn namespaced_name<T>(obj: &T) -> (String, String)
where
    T: ResourceExt,
{
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// returns the kind of the resource
pub fn kind<T>() -> String
where
    T: Resource<DynamicType = ()>,
{
    T::kind(&()).to_string()
}

/// returns differnce between the two given object serialize as json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// returns an object reference pointing to the given resource
pub fn object_reference<T>(obj: &T) -> ObjectReference
where
    T: Resource<DynamicType = ()>,
{
    obj.object_ref(&())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    use super::{diff, kind, namespaced_name, object_reference};

    fn secret(namespace: Option<&str>, data: Option<(&str, &str)>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("mysql-password".into()),
                namespace: namespace.map(ToString::to_string),
                ..Default::default()
            },
            string_data: data.map(|(k, v)| [(k.to_string(), v.to_string())].into()),
            ..Default::default()
        }
    }

    #[test]
    fn namespaced_name_defaults_to_empty_namespace() {
        assert_eq!(
            namespaced_name(&secret(Some("default"), None)),
            ("default".to_string(), "mysql-password".to_string())
        );
        assert_eq!(
            namespaced_name(&secret(None, None)),
            (String::new(), "mysql-password".to_string())
        );
    }

    #[test]
    fn diff_is_empty_for_identical_objects() {
        let origin = secret(Some("default"), Some(("key", "value")));

        let patch = diff(&origin, &origin.to_owned()).expect("diff to be computed");
        assert!(patch.0.is_empty());

        let modified = secret(Some("default"), Some(("key", "other")));
        let patch = diff(&origin, &modified).expect("diff to be computed");
        assert_eq!(patch.0.len(), 1);
    }

    #[test]
    fn object_reference_points_to_resource() {
        let reference = object_reference(&secret(Some("default"), None));

        assert_eq!(reference.kind.as_deref(), Some("Secret"));
        assert_eq!(reference.api_version.as_deref(), Some("v1"));
        assert_eq!(reference.name.as_deref(), Some("mysql-password"));
        assert_eq!(reference.namespace.as_deref(), Some("default"));
        assert_eq!(kind::<Secret>(), "Secret");
    }
}
