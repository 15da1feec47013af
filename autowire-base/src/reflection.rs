use std::path::Path;

use async_trait::async_trait;
use autowire::{CapabilityId, ContainerReflection, ReflectedService};

use crate::{ContractTable, GraphReport, ManifestError, ServiceReport, StdError};

/// Source of reports for graphs compiled by an earlier run.
#[async_trait]
pub trait ReflectionLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<GraphReport, StdError>;
}

/// Reads reports from JSON files.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileReflectionLoader;

#[async_trait]
impl ReflectionLoader for FileReflectionLoader {
    async fn load(&self, path: &Path) -> Result<GraphReport, StdError> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Surface of a compiled graph, described by its report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledGraph {
    name: String,
    public: Vec<ReflectedService>,
    dynamic: Vec<ReflectedService>,
}

impl CompiledGraph {
    /// Maps the contract keys of `report` onto `table`.
    pub fn new(report: &GraphReport, table: &ContractTable) -> Result<Self, ManifestError> {
        let mut public = Vec::new();
        let mut dynamic = Vec::new();
        for service in &report.services {
            if service.public {
                public.push(reflect(service, table)?);
            }
            if service.kind == "dynamic" {
                dynamic.push(reflect(service, table)?);
            }
        }
        Ok(Self {
            name: report.name.clone(),
            public,
            dynamic,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn reflect(service: &ServiceReport, table: &ContractTable) -> Result<ReflectedService, ManifestError> {
    Ok(ReflectedService {
        id: service.id.clone(),
        capability: table.capability(&service.capability)?,
        aliases: service
            .aliases
            .iter()
            .map(|v| table.capability(v))
            .collect::<Result<Vec<CapabilityId>, _>>()?,
        is_async: service.is_async,
    })
}

impl ContainerReflection for CompiledGraph {
    fn public_services(&self) -> Vec<ReflectedService> {
        self.public.clone()
    }

    fn dynamic_services(&self) -> Vec<ReflectedService> {
        self.dynamic.clone()
    }
}
