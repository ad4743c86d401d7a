//! # Store module
//!
//! This module provide the [`Store`] trait used by the handlers to mutate
//! resources, and its implementation on top of the kubernetes api. The
//! kubernetes api server is the only place where state is shared between
//! handlers.

use async_trait::async_trait;
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    Api, Client,
};
use tracing::{debug, trace};

use crate::svc::k8s::resource::{self, Namespaced};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute request on kubernetes api, {0}")]
    KubeClient(kube::Error),
    #[error("failed to compute diff between the original and modified object, {0}")]
    Diff(serde_json::Error),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::KubeClient(err)
    }
}

impl Error {
    /// returns if the error is a 'not found' answer of the kubernetes api
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KubeClient(kube::Error::Api(err)) if err.code == 404)
    }
}

// -----------------------------------------------------------------------------
// Store trait

/// provides the namespaced create, delete and status update calls issued by
/// the handlers
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// create the given object in its namespace
    async fn create<T>(&self, obj: &T) -> Result<T, Error>
    where
        T: Namespaced;

    /// delete the object of kind `T` with the given namespace and name
    async fn delete<T>(&self, namespace: &str, name: &str) -> Result<(), Error>
    where
        T: Namespaced;

    /// persist the status of `modified`, `origin` is the last persisted
    /// version of the object
    async fn patch_status<T>(&self, origin: &T, modified: &T) -> Result<T, Error>
    where
        T: Namespaced;
}

// -----------------------------------------------------------------------------
// KubeStore structure

/// [`Store`] backed by the kubernetes api server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl From<Client> for KubeStore {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn create<T>(&self, obj: &T) -> Result<T, Error>
    where
        T: Namespaced,
    {
        let (namespace, name) = resource::namespaced_name(obj);
        let kind = resource::kind::<T>();
        let api: Api<T> = Api::namespaced(self.client.to_owned(), &namespace);

        debug!(
            kind = kind,
            namespace = namespace,
            name = name,
            "Execute a request to create resource"
        );
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    async fn delete<T>(&self, namespace: &str, name: &str) -> Result<(), Error>
    where
        T: Namespaced,
    {
        let kind = resource::kind::<T>();
        let api: Api<T> = Api::namespaced(self.client.to_owned(), namespace);

        debug!(
            kind = kind,
            namespace = namespace,
            name = name,
            "Execute a request to delete resource"
        );
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn patch_status<T>(&self, origin: &T, modified: &T) -> Result<T, Error>
    where
        T: Namespaced,
    {
        let (namespace, name) = resource::namespaced_name(modified);
        let kind = resource::kind::<T>();
        let patch = resource::diff(origin, modified).map_err(Error::Diff)?;

        if patch.0.is_empty() {
            debug!(
                kind = kind,
                namespace = namespace,
                name = name,
                "Skip patch request on resource's status, no operation to apply"
            );
            return Ok(modified.to_owned());
        }

        trace!(
            kind = kind,
            namespace = namespace,
            name = name,
            patch = format!("{:?}", patch),
            "Execute patch request on resource's status"
        );
        let api: Api<T> = Api::namespaced(self.client.to_owned(), &namespace);
        Ok(api
            .patch_status(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
            .await?)
    }
}

// -----------------------------------------------------------------------------
// Recording store, test double
