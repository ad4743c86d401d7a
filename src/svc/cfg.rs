//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{
    convert::TryFrom,
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_RETRY: i64 = 500;

pub const DEFAULT_IMAGE_PREFIX: &str = "arm64v8/mysql:";
pub const DEFAULT_CONTAINER_NAME: &str = "mysql";
pub const DEFAULT_CONTAINER_PORT: i64 = 3306;
pub const DEFAULT_VOLUME_NAME: &str = "mysql-store";
pub const DEFAULT_VOLUME_PATH: &str = "/var/lib/mysql";
pub const DEFAULT_STORAGE_REQUEST: &str = "1Gi";
pub const DEFAULT_STORAGE_LIMIT: &str = "2Gi";
pub const DEFAULT_LABEL_KEY: &str = "app";
pub const DEFAULT_LABEL_VALUE: &str = "mysql";
pub const DEFAULT_REPLICAS: i64 = 1;
pub const DEFAULT_TERMINATION_GRACE_PERIOD: i64 = 10;
pub const DEFAULT_ENV_NAME: &str = "MYSQL_ROOT_PASSWORD";
pub const DEFAULT_PASSWORD: &str = "bytedance";
pub const DEFAULT_SECRET_NAME: &str = "mysql-password";
pub const DEFAULT_SERVICE_NAME: &str = "mysql";
pub const DEFAULT_WORKLOAD_SUFFIX: &str = "-deployment";
pub const DEFAULT_NAMING: &str = "shared";

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to load file '{0:?}', {1}")]
    File(PathBuf, ConfigError),
    #[error("failed to load configuration, {0}")]
    Build(ConfigError),
    #[error("failed to cast configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Operator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Operator {
    /// address of the health and metrics server
    #[serde(rename = "listen")]
    pub listen: SocketAddr,
    /// delay in milliseconds before pulling the watch stream after an error
    #[serde(rename = "retry")]
    pub retry: u64,
}

impl Operator {
    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry)
    }
}

// -----------------------------------------------------------------------------
// Naming enum

/// strategy used to name the secret and the service of a mysql instance
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Naming {
    /// fixed names shared by every instance of a namespace
    #[serde(rename = "shared")]
    Shared,
    /// names prefixed by the name of the custom resource
    #[serde(rename = "derived")]
    Derived,
}

// -----------------------------------------------------------------------------
// MySql structure

/// constants used to template the resources of a mysql instance
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct MySql {
    #[serde(rename = "image_prefix")]
    pub image_prefix: String,
    #[serde(rename = "container_name")]
    pub container_name: String,
    #[serde(rename = "container_port")]
    pub container_port: i32,
    #[serde(rename = "volume_name")]
    pub volume_name: String,
    #[serde(rename = "volume_path")]
    pub volume_path: String,
    #[serde(rename = "storage_request")]
    pub storage_request: String,
    #[serde(rename = "storage_limit")]
    pub storage_limit: String,
    #[serde(rename = "label_key")]
    pub label_key: String,
    #[serde(rename = "label_value")]
    pub label_value: String,
    #[serde(rename = "replicas")]
    pub replicas: i32,
    #[serde(rename = "termination_grace_period")]
    pub termination_grace_period: i64,
    #[serde(rename = "env_name")]
    pub env_name: String,
    #[serde(rename = "password")]
    pub password: String,
    #[serde(rename = "secret_name")]
    pub secret_name: String,
    #[serde(rename = "service_name")]
    pub service_name: String,
    #[serde(rename = "workload_suffix")]
    pub workload_suffix: String,
    #[serde(rename = "naming")]
    pub naming: Naming,
}

// -----------------------------------------------------------------------------
// Configuration structures

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    #[serde(rename = "operator")]
    pub operator: Operator,
    #[serde(rename = "mysql")]
    pub mysql: MySql,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        defaults()?
            .add_source(environment())
            .add_source(File::from(path.to_owned()).required(true))
            .build()
            .map_err(|err| Error::File(path, err))?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, Error> {
        let mut paths = vec![
            PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
        ];

        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(format!(
                "{}/.config/{}/config",
                home,
                env!("CARGO_PKG_NAME")
            )));
            paths.push(PathBuf::from(format!(
                "{}/.local/share/{}/config",
                home,
                env!("CARGO_PKG_NAME")
            )));
        }

        paths.push(PathBuf::from("config"));

        let mut builder = defaults()?.add_source(environment());
        for path in paths {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

// -----------------------------------------------------------------------------
// helpers

fn environment() -> Environment {
    Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_")).separator("__")
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, Error> {
    let builder = Config::builder();

    let builder = default(builder, "operator.listen", DEFAULT_LISTEN)?;
    let builder = default(builder, "operator.retry", DEFAULT_RETRY)?;

    let builder = default(builder, "mysql.image_prefix", DEFAULT_IMAGE_PREFIX)?;
    let builder = default(builder, "mysql.container_name", DEFAULT_CONTAINER_NAME)?;
    let builder = default(builder, "mysql.container_port", DEFAULT_CONTAINER_PORT)?;
    let builder = default(builder, "mysql.volume_name", DEFAULT_VOLUME_NAME)?;
    let builder = default(builder, "mysql.volume_path", DEFAULT_VOLUME_PATH)?;
    let builder = default(builder, "mysql.storage_request", DEFAULT_STORAGE_REQUEST)?;
    let builder = default(builder, "mysql.storage_limit", DEFAULT_STORAGE_LIMIT)?;
    let builder = default(builder, "mysql.label_key", DEFAULT_LABEL_KEY)?;
    let builder = default(builder, "mysql.label_value", DEFAULT_LABEL_VALUE)?;
    let builder = default(builder, "mysql.replicas", DEFAULT_REPLICAS)?;
    let builder = default(
        builder,
        "mysql.termination_grace_period",
        DEFAULT_TERMINATION_GRACE_PERIOD,
    )?;
    let builder = default(builder, "mysql.env_name", DEFAULT_ENV_NAME)?;
    let builder = default(builder, "mysql.password", DEFAULT_PASSWORD)?;
    let builder = default(builder, "mysql.secret_name", DEFAULT_SECRET_NAME)?;
    let builder = default(builder, "mysql.service_name", DEFAULT_SERVICE_NAME)?;
    let builder = default(builder, "mysql.workload_suffix", DEFAULT_WORKLOAD_SUFFIX)?;
    default(builder, "mysql.naming", DEFAULT_NAMING)
}

fn default<T>(
    builder: ConfigBuilder<DefaultState>,
    key: &str,
    value: T,
) -> Result<ConfigBuilder<DefaultState>, Error>
where
    T: Into<config::Value>,
{
    builder
        .set_default(key, value)
        .map_err(|err| Error::Default(key.to_string(), err))
}

#[cfg(test)]
impl Default for Configuration {
    fn default() -> Self {
        defaults()
            .expect("defaults to be valid")
            .build()
            .expect("defaults to build")
            .try_deserialize()
            .expect("defaults to deserialize")
    }
}
