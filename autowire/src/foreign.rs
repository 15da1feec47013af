//! Merging the public surface of nested graphs.
//!
//! A container provider produces a nested graph. Each public service of that
//! graph is imported into the enclosing graph as a foreign definition, and
//! each dynamic service of it may be satisfied from the enclosing graph.

use crate::{
    AutowireError, AutowiringError, CapabilityId, Contracts, DefinitionGraph, ErrorContext,
    ProviderDefinition, ProviderId, ProviderKind,
};

/// A service as seen from outside its graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflectedService {
    pub id: String,
    pub capability: CapabilityId,
    pub aliases: Vec<CapabilityId>,
    pub is_async: bool,
}

/// Read access to the surface of a graph that may be nested in another one.
///
/// Implemented by [`ResolvedGraph`](crate::ResolvedGraph) for graphs analyzed in
/// the same process. Graphs analyzed elsewhere can be described by reflecting
/// over their compiled output.
pub trait ContainerReflection {
    fn public_services(&self) -> Vec<ReflectedService>;

    fn dynamic_services(&self) -> Vec<ReflectedService>;
}

/// Snapshot of a [`ContainerReflection`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReflectedGraph {
    pub public: Vec<ReflectedService>,
    pub dynamic: Vec<ReflectedService>,
}

impl ReflectedGraph {
    pub fn capture(reflection: &dyn ContainerReflection) -> Self {
        Self {
            public: reflection.public_services(),
            dynamic: reflection.dynamic_services(),
        }
    }
}

impl ContainerReflection for ReflectedGraph {
    fn public_services(&self) -> Vec<ReflectedService> {
        self.public.clone()
    }

    fn dynamic_services(&self) -> Vec<ReflectedService> {
        self.dynamic.clone()
    }
}

/// Dynamic service of a nested graph filled from the enclosing graph when
/// the container is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubRegistration {
    pub service: String,
    pub capability: CapabilityId,
    pub provider: ProviderId,
}

/// Imports every public service of `container` as a foreign definition.
pub(crate) fn import(
    graph: &mut DefinitionGraph,
    container: ProviderId,
) -> Result<Vec<ProviderId>, AutowireError> {
    let definition = graph.definition(container);
    let ProviderKind::Container { reflection, .. } = &definition.kind else {
        return Ok(Vec::new());
    };
    let prefix = definition.id.clone();
    let scope = definition.scope;
    let services = reflection.public.clone();
    let mut imported = Vec::with_capacity(services.len());
    for service in services {
        let mut foreign = ProviderDefinition {
            id: format!("{prefix}.{}", service.id),
            capability: service.capability,
            aliases: Vec::new(),
            kind: ProviderKind::Foreign {
                container,
                service: service.id.clone(),
                is_async: service.is_async,
            },
            scope,
            hooks: Default::default(),
            public: false,
            explicit: true,
            location: graph.definition(container).location.clone(),
        };
        for alias in service.aliases {
            foreign = foreign.alias(alias);
        }
        tracing::trace!(graph = %graph.name(), service = %foreign.id, "Import foreign service");
        imported.push(graph.insert(foreign)?);
    }
    Ok(imported)
}

/// Binds every dynamic service of `container` to a uniquely matching
/// candidate of the enclosing graph.
pub(crate) fn bind_dynamic(
    graph: &mut DefinitionGraph,
    contracts: &Contracts,
    container: ProviderId,
) -> Result<(), AutowireError> {
    let ProviderKind::Container { reflection, .. } = &graph.definition(container).kind else {
        return Ok(());
    };
    let services = reflection.dynamic.clone();
    for service in services {
        let candidates: Vec<ProviderId> = graph
            .index()
            .find(service.capability)
            .iter()
            .copied()
            .filter(|v| *v != container && !is_imported_from(graph, *v, container))
            .collect();
        match candidates.as_slice() {
            [] => {
                tracing::trace!(
                    graph = %graph.name(),
                    service = %service.id,
                    "Dynamic service left for run-time registration"
                );
            }
            [provider] => {
                let registration = SubRegistration {
                    service: service.id.clone(),
                    capability: service.capability,
                    provider: *provider,
                };
                graph.state_mut(container).bindings.push(registration);
            }
            _ => {
                let definition = graph.definition(container);
                return Err(AutowireError::Autowiring {
                    context: ErrorContext::graph(graph.name())
                        .provider(definition.id.clone())
                        .location(definition.location.clone()),
                    error: AutowiringError::AmbiguousDynamicBinding {
                        service: service.id.clone(),
                        capability: contracts.name(service.capability).to_owned(),
                        candidates: candidates
                            .iter()
                            .map(|v| graph.definition(*v).id.clone())
                            .collect(),
                    },
                });
            }
        }
    }
    Ok(())
}

fn is_imported_from(graph: &DefinitionGraph, id: ProviderId, container: ProviderId) -> bool {
    matches!(
        graph.definition(id).kind,
        ProviderKind::Foreign { container: v, .. } if v == container
    )
}
