//! # Command module
//!
//! This module provide command line interface structures and helpers
use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api,
};
use tracing::{error, info};

use crate::{
    cmd::crd::CustomResourceDefinitionError,
    svc::{
        cfg::Configuration,
        crd::mysql::{MySql, Reconciler},
        http,
        k8s::{self, client, store::KubeStore, watcher::Coordinator},
    },
};

pub mod crd;

// -----------------------------------------------------------------------------
// Executor trait

#[async_trait]
pub trait Executor {
    type Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error>;
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command '{0}', {1}")]
    Execution(String, Arc<Error>),
    #[error("failed to execute command, {0}")]
    CustomResourceDefinition(CustomResourceDefinitionError),
    #[error("failed to run daemon, {0}")]
    Daemon(DaemonError),
}

// -----------------------------------------------------------------------------
// Command enum

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Interact with custom resource definition
    #[clap(name = "custom-resource-definition", aliases = &["crd"], subcommand)]
    CustomResourceDefinition(crd::CustomResourceDefinition),
}

#[async_trait]
impl Executor for Command {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::CustomResourceDefinition(crd) => crd
                .execute(config)
                .await
                .map_err(Error::CustomResourceDefinition)
                .map_err(|err| {
                    Error::Execution("custom-resource-definition".into(), Arc::new(err))
                }),
        }
    }
}

// -----------------------------------------------------------------------------
// Args struct

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Args {
    /// Increase log verbosity
    #[clap(short = 'v', global = true, action = ArgAction::Count)]
    pub verbosity: u8,
    /// Specify location of kubeconfig, inferred from $KUBECONFIG, then
    /// ~/.kube/config, then the in-cluster service account if omitted
    #[clap(short = 'k', long = "kubeconfig", global = true)]
    pub kubeconfig: Option<PathBuf>,
    /// Specify location of configuration
    #[clap(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Check if configuration is healthy
    #[clap(short = 't', long = "check", global = true)]
    pub check: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

// -----------------------------------------------------------------------------
// DaemonError enum

#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error("failed to create kubernetes client, {0}")]
    Client(client::Error),
    #[error("failed to watch mysql custom resources, {0}")]
    Watch(k8s::watcher::Error),
}

// -----------------------------------------------------------------------------
// daemon function

pub async fn daemon(
    kubeconfig: Option<PathBuf>,
    config: Arc<Configuration>,
) -> Result<(), DaemonError> {
    // -------------------------------------------------------------------------
    // Create a new kubernetes client from path if defined, or via the
    // environment or defaults locations
    let kube_client = client::try_new(kubeconfig)
        .await
        .map_err(DaemonError::Client)?;

    // -------------------------------------------------------------------------
    // Create the handler and the coordinator of mysql custom resources
    let store = KubeStore::from(kube_client.to_owned());
    let reconciler = Arc::new(Reconciler::new(store, config.to_owned()));
    let coordinator = Coordinator::new(reconciler, config.operator.retry());

    // -------------------------------------------------------------------------
    // Serve probes and metrics
    let addr = config.operator.listen.to_owned();
    let readiness = coordinator.readiness();
    let server = tokio::spawn(async move {
        if let Err(err) = http::serve(addr, readiness).await {
            error!(error = err.to_string(), "Could not serve http server");
        }
    });

    // -------------------------------------------------------------------------
    // Watch mysql custom resources of every namespace until the termination
    // signal is received
    let api: Api<MySql> = Api::all(kube_client);
    let stream = watcher(api, watcher::Config::default()).default_backoff();

    info!("Start to listen for events of mysql custom resource");
    let result = coordinator
        .run(stream, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = err.to_string(), "Could not handle termination signal");
            }
        })
        .await
        .map_err(DaemonError::Watch);

    server.abort();
    result
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};

    use super::{Args, Command};

    #[test]
    fn parse_daemon_flags() {
        let args = Args::parse_from(["mysql-operator", "-vvv", "-k", "/tmp/kubeconfig", "-t"]);

        assert_eq!(args.verbosity, 3);
        assert_eq!(args.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
        assert!(args.check);
        assert!(args.command.is_none());
    }

    #[test]
    fn parse_crd_alias() {
        let args = Args::parse_from(["mysql-operator", "crd", "v", "mysql"]);

        assert!(matches!(
            args.command,
            Some(Command::CustomResourceDefinition(_))
        ));
    }

    #[test]
    fn kubeconfig_help_mentions_inference_order() {
        let command = Args::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "kubeconfig")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string)
            .expect("kubeconfig argument to be documented");

        assert!(help.contains("~/.kube/config"));
        assert!(help.contains("in-cluster"));
    }
}
