//! # Kubernetes module
//!
//! This module provide kubernetes helpers, the store used to mutate resources
//! and the coordinator dispatching lifecycle notifications to handlers

use std::sync::Arc;

use async_trait::async_trait;

pub mod client;
pub mod recorder;
pub mod resource;
pub mod store;
pub mod watcher;

// -----------------------------------------------------------------------------
// constants

pub const NOTIFICATION_ADD: &str = "add";
pub const NOTIFICATION_UPDATE: &str = "update";
pub const NOTIFICATION_DELETE: &str = "delete";

// -----------------------------------------------------------------------------
// Handler trait

/// provides the methods called for each lifecycle notification of a
/// kubernetes resource, there is no way to report an error to the caller, the
/// handler is responsible to log and surface it
#[async_trait]
pub trait Handler<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    /// the object has been observed for the first time
    async fn add(&self, obj: Arc<T>);

    /// the object has been modified
    async fn update(&self, old: Arc<T>, new: Arc<T>);

    /// the object has been deleted
    async fn delete(&self, obj: Arc<T>);
}
