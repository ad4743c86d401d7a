//! # Status module
//!
//! This module provide the reporter writing the provisioning phase in the
//! status of a [`MySql`] resource

use tracing::debug;

use crate::svc::{
    crd::mysql::{MySql, Phase},
    k8s::{resource, store},
};

// -----------------------------------------------------------------------------
// Reporter structure

/// holds the copy of the object that triggered the notification, the copy is
/// replaced by the persisted object after each successful report
#[derive(Clone, Debug)]
pub struct Reporter {
    current: MySql,
}

impl From<MySql> for Reporter {
    fn from(current: MySql) -> Self {
        Self { current }
    }
}

impl Reporter {
    pub fn current(&self) -> &MySql {
        &self.current
    }

    /// set the phase in the status message and persist it through the status
    /// sub-resource, no retry is made
    pub async fn report<S>(&mut self, store: &S, phase: Phase) -> Result<(), store::Error>
    where
        S: store::Store,
    {
        let (namespace, name) = resource::namespaced_name(&self.current);
        let mut modified = self.current.to_owned();
        modified.set_phase(phase);

        debug!(
            namespace = namespace,
            name = name,
            phase = phase.to_string(),
            "Update status of custom resource"
        );
        self.current = store.patch_status(&self.current, &modified).await?;
        Ok(())
    }
}
