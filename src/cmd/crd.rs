//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::{error::Error, str::FromStr, sync::Arc};

use async_trait::async_trait;
use clap::Subcommand;
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{cfg::Configuration, crd::mysql::MySql},
};

// -----------------------------------------------------------------------------
// CustomResource enum

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub enum CustomResource {
    MySql,
}

impl FromStr for CustomResource {
    type Err = Box<dyn Error + Send + Sync>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            _ => Err(format!("failed to parse '{}', available option is 'mysql'", s).into()),
        }
    }
}

// -----------------------------------------------------------------------------
// CustomResourceDefinitionError enum

#[derive(thiserror::Error, Debug)]
pub enum CustomResourceDefinitionError {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[clap(name = "view", aliases = &["v"])]
    View {
        #[clap(name = "custom-resource")]
        custom_resource: Option<CustomResource>,
    },
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = CustomResourceDefinitionError;

    async fn execute(&self, _config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View { custom_resource } => {
                print!("{}", view(custom_resource)?);
                Ok(())
            }
        }
    }
}

// -----------------------------------------------------------------------------
// view function

/// returns the yaml manifest of the given custom resource definition, or of
/// all of them
pub fn view(
    custom_resource: &Option<CustomResource>,
) -> Result<String, CustomResourceDefinitionError> {
    let crds = match custom_resource {
        Some(CustomResource::MySql) | None => vec![serde_yaml::to_string(&MySql::crd())
            .map_err(CustomResourceDefinitionError::Serialize)?],
    };

    Ok(crds.join("---\n"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{view, CustomResource};

    #[test]
    fn parse_custom_resource() {
        assert_eq!(
            CustomResource::from_str("MySQL").expect("mysql to be known"),
            CustomResource::MySql
        );
        assert!(CustomResource::from_str("redis").is_err());
    }

    #[test]
    fn view_mysql_definition() {
        let manifest = view(&Some(CustomResource::MySql)).expect("definition to serialize");

        assert!(manifest.contains("name: mysqls.volc.cyhw.io"));
        assert!(manifest.contains("kind: MySQL"));
        assert!(manifest.contains("v1alpha1"));
        assert!(manifest.contains("Namespaced"));
    }
}
