//! # Event recorder module
//!
//! This module provide an alternative to the golang EventRecorder structure
//!
//! See following links for more details:
//! - <https://book-v1.book.kubebuilder.io/beyond_basics/creating_events.html>
//! - <https://github.com/kubernetes/client-go/blob/master/tools/record/event.go#L56>

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use tracing::{debug, warn};

use crate::svc::k8s::{
    resource::{self, Namespaced},
    store::Store,
};

pub mod event;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to parse '{0}', available options are 'normal' or 'warning'")]
    Parse(String),
}

// -----------------------------------------------------------------------------
// Level enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum Level {
    Warning,
    Normal,
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "warning" => Self::Warning,
            "normal" => Self::Normal,
            _ => {
                return Err(Error::Parse(s.to_string()));
            }
        })
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "Warning"),
            Self::Normal => write!(f, "Normal"),
        }
    }
}

// -----------------------------------------------------------------------------
// Helper methods

/// record an event for the given object, a failure is logged and swallowed as
/// events are informative
pub async fn record<S, T, U>(store: &S, obj: &T, level: Level, action: &U, message: &str)
where
    S: Store,
    T: Namespaced,
    U: ToString,
{
    let (namespace, name) = resource::namespaced_name(obj);
    let kind = resource::kind::<T>();
    let action = action.to_string();

    debug!(
        kind = kind,
        namespace = namespace,
        name = name,
        action = action,
        level = level.to_string(),
        message = message,
        "Create event for resource"
    );

    let event = event::new(obj, level, &action, message);
    if let Err(err) = store.create(&event).await {
        warn!(
            kind = kind,
            namespace = namespace,
            name = name,
            action = action,
            error = err.to_string(),
            "Failed to create event for resource"
        );
    }
}

/// shortcut for the [`record`] method with the 'Normal' [`Level`]
pub async fn normal<S, T, U>(store: &S, obj: &T, action: &U, message: &str)
where
    S: Store,
    T: Namespaced,
    U: ToString,
{
    record(store, obj, Level::Normal, action, message).await
}

/// shortcut for the [`record`] method with the 'Warning' [`Level`]
pub async fn warning<S, T, U>(store: &S, obj: &T, action: &U, message: &str)
where
    S: Store,
    T: Namespaced,
    U: ToString,
{
    record(store, obj, Level::Warning, action, message).await
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    use super::{warning, Level};
    use crate::svc::k8s::store::testing::{RecordingStore, Verb};

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!(Level::from_str("Normal").ok(), Some(Level::Normal));
        assert_eq!(Level::from_str("WARNING").ok(), Some(Level::Warning));
        assert!(Level::from_str("critical").is_err());
        assert_eq!(Level::Warning.to_string(), "Warning");
    }

    #[tokio::test]
    async fn event_failure_is_swallowed() {
        let store = RecordingStore::default().fail(Verb::Create, "Event");
        let obj = Secret {
            metadata: ObjectMeta {
                name: Some("mysql-password".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        warning(&store, &obj, &"DeleteSecret", "could not delete").await;

        let calls = store.all();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, "Event");
        assert_eq!(calls[0].namespace, "default");
        assert_eq!(
            calls[0].payload.pointer("/type").and_then(|v| v.as_str()),
            Some("Warning")
        );
    }
}
