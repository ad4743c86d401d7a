//! # Watcher module
//!
//! This module provide the coordinator turning the events of a kubernetes
//! watch stream into ADD, UPDATE and DELETE notifications. Nothing is
//! dispatched before the first complete listing of the watched resources has
//! been received.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{Stream, StreamExt};
use kube::{runtime::watcher, Resource, ResourceExt};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::svc::k8s::{resource, Handler};
#[cfg(feature = "metrics")]
use crate::svc::k8s::{NOTIFICATION_ADD, NOTIFICATION_DELETE, NOTIFICATION_UPDATE};

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static NOTIFICATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_notification",
            "number of dispatched notification",
        ),
        &["kind", "namespace", "event"]
    )
    .expect("metrics 'kubernetes_operator_notification' to not be already registered")
});

#[cfg(feature = "metrics")]
static WATCH_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "kubernetes_operator_watch_failed",
            "number of errors received on the watch stream",
        ),
        &["kind"]
    )
    .expect("metrics 'kubernetes_operator_watch_failed' to not be already registered")
});

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to wait for the watch cache to sync, shutdown signal received first")]
    CacheSync,
    #[error("failed to wait for the watch cache to sync, the watch stream has been closed")]
    StreamClosed,
}

// -----------------------------------------------------------------------------
// Notification enumeration

#[derive(Debug)]
pub enum Notification<T> {
    Add(Arc<T>),
    Update(Arc<T>, Arc<T>),
    Delete(Arc<T>),
}

// -----------------------------------------------------------------------------
// Coordinator structure

/// keeps the last observed version of every watched object and dispatches
/// each notification to the handler on its own task
pub struct Coordinator<T, H> {
    handler: Arc<H>,
    cache: BTreeMap<(String, String), Arc<T>>,
    synced: Arc<AtomicBool>,
    retry: Duration,
}

impl<T, H> Coordinator<T, H>
where
    T: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
    H: Handler<T>,
{
    pub fn new(handler: Arc<H>, retry: Duration) -> Self {
        Self {
            handler,
            cache: BTreeMap::new(),
            synced: Arc::new(AtomicBool::new(false)),
            retry,
        }
    }

    /// returns the flag raised once the watch cache synced
    pub fn readiness(&self) -> Arc<AtomicBool> {
        self.synced.to_owned()
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// consume the watch stream until the shutdown future resolves, returns
    /// an error if the cache could not sync before
    pub async fn run<S, F>(mut self, stream: S, shutdown: F) -> Result<(), Error>
    where
        S: Stream<Item = Result<watcher::Event<T>, watcher::Error>> + Send,
        F: Future<Output = ()> + Send,
    {
        let kind = resource::kind::<T>();
        let mut stream = Box::pin(stream);
        tokio::pin!(shutdown);

        info!(kind = kind, "Wait for watch cache to sync");
        loop {
            let item = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    return self.shutdown();
                }
                item = stream.next() => item,
            };

            match item {
                None if self.synced() => {
                    debug!(kind = kind, "We have reached the end of the watch stream");
                    return Ok(());
                }
                None => {
                    return Err(Error::StreamClosed);
                }
                Some(Err(err)) => {
                    warn!(
                        kind = kind,
                        error = err.to_string(),
                        "Failed to receive event from watch stream, drop it"
                    );
                    #[cfg(feature = "metrics")]
                    WATCH_FAILED.with_label_values(&[&kind]).inc();

                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            return self.shutdown();
                        }
                        _ = sleep(self.retry) => {}
                    }
                }
                Some(Ok(event)) => {
                    for notification in self.observe(event) {
                        self.dispatch(notification);
                    }
                }
            }
        }
    }

    fn shutdown(&self) -> Result<(), Error> {
        if !self.synced() {
            return Err(Error::CacheSync);
        }

        info!(kind = resource::kind::<T>(), "Shut down");
        Ok(())
    }

    /// update the cache with the event and returns the notifications to
    /// dispatch
    fn observe(&mut self, event: watcher::Event<T>) -> Vec<Notification<T>> {
        match event {
            watcher::Event::Restarted(objs) => {
                let synced = self.synced();
                let mut previous = if synced {
                    std::mem::take(&mut self.cache)
                } else {
                    BTreeMap::new()
                };

                let mut notifications = vec![];
                self.cache = BTreeMap::new();
                for obj in objs {
                    let key = resource::namespaced_name(&obj);
                    let obj = Arc::new(obj);

                    notifications.push(match previous.remove(&key) {
                        Some(old) => Notification::Update(old, obj.to_owned()),
                        None => Notification::Add(obj.to_owned()),
                    });

                    self.cache.insert(key, obj);
                }

                notifications.extend(previous.into_values().map(Notification::Delete));

                if !synced {
                    self.synced.store(true, Ordering::SeqCst);
                    info!(
                        kind = resource::kind::<T>(),
                        objects = self.cache.len(),
                        "Watch cache synced"
                    );
                }

                notifications
            }
            _ if !self.synced() => {
                trace!(
                    kind = resource::kind::<T>(),
                    "Ignore event received before the initial listing"
                );
                vec![]
            }
            watcher::Event::Applied(obj) => {
                let key = resource::namespaced_name(&obj);
                let obj = Arc::new(obj);

                match self.cache.insert(key, obj.to_owned()) {
                    Some(old) => vec![Notification::Update(old, obj)],
                    None => vec![Notification::Add(obj)],
                }
            }
            watcher::Event::Deleted(obj) => {
                self.cache.remove(&resource::namespaced_name(&obj));
                vec![Notification::Delete(Arc::new(obj))]
            }
        }
    }

    /// run the handler on a dedicated task, the task is neither awaited nor
    /// cancelled
    fn dispatch(&self, notification: Notification<T>) {
        let handler = self.handler.to_owned();

        #[cfg(feature = "metrics")]
        {
            let (obj, event) = match &notification {
                Notification::Add(obj) => (obj, NOTIFICATION_ADD),
                Notification::Update(_, obj) => (obj, NOTIFICATION_UPDATE),
                Notification::Delete(obj) => (obj, NOTIFICATION_DELETE),
            };

            NOTIFICATION
                .with_label_values(&[
                    &resource::kind::<T>(),
                    &obj.namespace().unwrap_or_default(),
                    event,
                ])
                .inc();
        }

        tokio::spawn(async move {
            match notification {
                Notification::Add(obj) => handler.add(obj).await,
                Notification::Update(old, new) => handler.update(old, new).await,
                Notification::Delete(obj) => handler.delete(obj).await,
            }
        });
    }
}
