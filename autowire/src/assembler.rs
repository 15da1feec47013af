//! Orchestration of a full analysis pass over one graph.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::mem;

use crate::asynchrony::{self, AsyncCell};
use crate::graph::Node;
use crate::resolve::{Resolver, auto_method};
use crate::{
    AutowireError, AutowiringError, Bridging, Callable, CapabilityId, CapabilityIndex,
    ContainerReflection, Contracts, DecoratorDefinition, DecoratorId, DefinitionError,
    DefinitionGraph, ErrorContext, HoistOrigin, HoistedArgument, InjectedValue, Injection,
    InternalError, ProviderDefinition, ProviderId, ProviderKind, ProviderPlan, ReflectedService,
    Scope, Signature, foreign,
};

/// Collects the definitions of one graph and resolves them.
///
/// ```
/// use autowire::{Callable, Contracts, GraphAssembler, ProviderDefinition, Signature};
///
/// let mut contracts = Contracts::new();
/// let config = contracts.declare("Config");
/// let database = contracts.declare("Database");
///
/// let mut assembler = GraphAssembler::new("app", &contracts);
/// assembler
///     .add_provider(ProviderDefinition::factory("config", config, Callable::new("Config::new")))
///     .unwrap();
/// assembler
///     .add_provider(ProviderDefinition::factory(
///         "database",
///         database,
///         Callable::new("Database::connect")
///             .param("config", Signature::of(config))
///             .asynchronous(),
///     ))
///     .unwrap();
///
/// let graph = assembler.assemble().unwrap();
/// let database = graph.find("database").unwrap();
/// assert!(database.is_async);
/// ```
pub struct GraphAssembler<'c> {
    contracts: &'c Contracts,
    graph: DefinitionGraph,
}

impl<'c> GraphAssembler<'c> {
    /// Creates an empty assembler for the graph `name`. Every capability of
    /// the added definitions must be declared in `contracts`.
    pub fn new(name: impl Into<String>, contracts: &'c Contracts) -> Self {
        Self {
            contracts,
            graph: DefinitionGraph::new(name),
        }
    }

    /// Adds a provider definition.
    ///
    /// # Returns
    ///
    /// The id of the provider, or [`DefinitionError::DuplicateId`] when the
    /// graph already has a provider with the same id and
    /// [`DefinitionError::ForeignDeclared`] for foreign definitions, which
    /// only the assembler creates.
    pub fn add_provider(
        &mut self,
        definition: ProviderDefinition,
    ) -> Result<ProviderId, AutowireError> {
        if definition.is_foreign() {
            return Err(AutowireError::Definition {
                context: ErrorContext::graph(self.graph.name())
                    .location(definition.location.clone()),
                error: DefinitionError::ForeignDeclared(definition.id),
            });
        }
        self.graph.insert(definition)
    }

    /// Adds a provider whose value is the nested graph described by
    /// `reflection`.
    pub fn add_container(
        &mut self,
        id: impl Into<String>,
        capability: CapabilityId,
        factory: Callable,
        reflection: &dyn ContainerReflection,
    ) -> Result<ProviderId, AutowireError> {
        self.add_provider(ProviderDefinition::container(
            id, capability, factory, reflection,
        ))
    }

    /// Adds a decorator. It is attached to every provider of its target
    /// capability that survives cleanup.
    pub fn add_decorator(&mut self, definition: DecoratorDefinition) -> DecoratorId {
        self.graph.insert_decorator(definition)
    }

    pub fn graph(&self) -> &DefinitionGraph {
        &self.graph
    }

    /// Resolves every definition and evaluates every async flag.
    ///
    /// Fails on the first error.
    pub fn assemble(mut self) -> Result<ResolvedGraph, AutowireError> {
        let span = tracing::debug_span!("assemble", graph = %self.graph.name());
        let _guard = span.enter();
        self.import_containers()?;
        self.cleanup();
        self.bind_containers()?;
        self.attach_decorators();
        self.prepare_auto_implementations()?;
        self.resolve()?;
        let graph = self.finalize()?;
        tracing::debug!(providers = graph.iter().count(), "Graph assembled");
        Ok(graph)
    }

    fn containers(&self) -> Vec<ProviderId> {
        self.graph
            .providers()
            .filter(|(_, v)| v.is_container())
            .map(|(id, _)| id)
            .collect()
    }

    fn import_containers(&mut self) -> Result<(), AutowireError> {
        for container in self.containers() {
            let imported = foreign::import(&mut self.graph, container)?;
            tracing::debug!(
                container = %self.graph.definition(container).id,
                services = imported.len(),
                "Merged nested graph"
            );
        }
        Ok(())
    }

    /// Removes implicit definitions superseded by an explicit one.
    ///
    /// A removed container takes the services imported from it along.
    /// Superseded containers go first and the rest is recomputed.
    fn cleanup(&mut self) {
        loop {
            let superseded = self.superseded();
            if superseded.is_empty() {
                break;
            }
            let containers: Vec<ProviderId> = superseded
                .iter()
                .copied()
                .filter(|v| self.graph.definition(*v).is_container())
                .collect();
            let batch = if containers.is_empty() {
                superseded
            } else {
                containers
            };
            for id in batch {
                tracing::debug!(
                    provider = %self.graph.definition(id).id,
                    "Remove superseded service"
                );
                for imported in self.imported_from(id) {
                    self.graph.remove(imported);
                }
                self.graph.remove(id);
            }
        }
    }

    fn superseded(&self) -> Vec<ProviderId> {
        self.graph
            .providers()
            .filter(|(id, definition)| {
                if definition.explicit {
                    return false;
                }
                let own = self.imported_from(*id);
                self.graph
                    .index()
                    .find(definition.capability)
                    .iter()
                    .any(|v| v != id && self.graph.definition(*v).explicit && !own.contains(v))
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn imported_from(&self, container: ProviderId) -> Vec<ProviderId> {
        self.graph
            .providers()
            .filter(|(_, v)| {
                matches!(v.kind, ProviderKind::Foreign { container: c, .. } if c == container)
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn bind_containers(&mut self) -> Result<(), AutowireError> {
        for container in self.containers() {
            foreign::bind_dynamic(&mut self.graph, self.contracts, container)?;
        }
        Ok(())
    }

    fn attach_decorators(&mut self) {
        let mut order: Vec<DecoratorId> = (0..self.graph.decorators().len())
            .map(DecoratorId::new)
            .collect();
        order.sort_by_key(|v| Reverse(self.graph.decorator(*v).priority));
        for decorator in order {
            let target = self.graph.decorator(decorator).target;
            for provider in self.graph.index().find(target).to_vec() {
                self.graph.state_mut(provider).decorators.push(decorator);
            }
        }
        let overrides: Vec<(ProviderId, Scope)> = self
            .graph
            .providers()
            .filter_map(|(id, _)| {
                self.graph
                    .state(id)
                    .decorators
                    .iter()
                    .find_map(|v| self.graph.decorator(*v).scope)
                    .map(|scope| (id, scope))
            })
            .collect();
        for (id, scope) in overrides.iter().copied() {
            self.graph.state_mut(id).scope = scope;
        }
        // Imported services follow the effective scope of their container.
        let imported: Vec<(ProviderId, ProviderId)> = self
            .graph
            .providers()
            .filter(|(id, _)| !overrides.iter().any(|(v, _)| v == id))
            .filter_map(|(id, v)| match v.kind {
                ProviderKind::Foreign { container, .. } => Some((id, container)),
                _ => None,
            })
            .collect();
        for (id, container) in imported {
            let scope = self.graph.scope(container);
            self.graph.state_mut(id).scope = scope;
        }
    }

    /// Records the factory arguments each auto-implemented method forwards
    /// to its target.
    fn prepare_auto_implementations(&mut self) -> Result<(), AutowireError> {
        let mut forwarded = Vec::new();
        for (id, definition) in self.graph.providers() {
            if !matches!(definition.kind, ProviderKind::AutoImplemented) {
                continue;
            }
            // Malformed contracts are reported when the provider is visited.
            let Some(method) = auto_method(self.contracts, definition) else {
                continue;
            };
            let returns = match &method.returns {
                Signature::Deferred(v) => v.as_ref(),
                v => v,
            };
            let &Signature::Capability(capability) = returns else {
                continue;
            };
            if let [target] = self.graph.index().find(capability) {
                forwarded.push((id, *target, method.params.clone()));
            }
        }
        for (id, target, params) in forwarded {
            let conflict = matches!(
                &self.graph.state(target).forwarded,
                Some(existing) if *existing != params
            );
            if conflict {
                return Err(AutowireError::Definition {
                    context: self.graph.context(id),
                    error: DefinitionError::ConflictingAutoImplementation {
                        target: self.graph.definition(target).id.clone(),
                    },
                });
            }
            self.graph.state_mut(target).forwarded = Some(params);
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<(), AutowireError> {
        let ids: Vec<ProviderId> = self.graph.providers().map(|(id, _)| id).collect();
        tracing::debug!(providers = ids.len(), "Resolve services");
        let mut resolver = Resolver::new(self.contracts, &mut self.graph);
        for id in ids {
            resolver.visit(id)?;
        }
        if !resolver.is_idle() {
            return Err(InternalError::ChainMismatch {
                expected: "empty chain".to_owned(),
                actual: None,
            }
            .into());
        }
        Ok(())
    }

    fn finalize(self) -> Result<ResolvedGraph, AutowireError> {
        let (name, mut nodes, decorators, index) = self.graph.into_parts();
        let mut cells: Vec<AsyncCell> = nodes
            .iter_mut()
            .map(|v| mem::take(&mut v.state.asynchrony))
            .collect();
        let ids: Vec<String> = nodes.iter().map(|v| v.definition.id.clone()).collect();
        asynchrony::resolve_all(&mut cells).map_err(|id| InternalError::PrematureAsyncRead {
            provider: ids[id.index()].clone(),
        })?;
        let flags = Flags {
            cells: &cells,
            ids: &ids,
        };
        tracing::debug!(graph = %name, "Resolved async flags");

        for node in nodes.iter_mut().filter(|v| !v.state.removed) {
            for injection in node.state.plan.injections_mut() {
                bridge(injection, &flags)?;
            }
            if let Some(auto) = &mut node.state.plan.auto
                && auto.async_method
            {
                auto.bridging = Bridging::between(flags.get(auto.target)?, true);
            }
        }

        for node in nodes.iter().filter(|v| !v.state.removed) {
            for constraint in &node.state.constraints {
                if flags.get(constraint.dependency)? {
                    return Err(AutowireError::Autowiring {
                        context: node_context(&name, node).argument(constraint.argument.clone()),
                        error: AutowiringError::AsyncIntoSyncConsumer {
                            dependency: ids[constraint.dependency.index()].clone(),
                            mode: constraint.mode,
                        },
                    });
                }
            }
        }

        let mut hoisting: HashMap<ProviderId, (Vec<HoistedArgument>, ProviderPlan)> =
            HashMap::new();
        for index in 0..nodes.len() {
            let node = &nodes[index];
            let Some(auto) = node.state.plan.auto.as_ref().filter(|v| !v.async_method) else {
                continue;
            };
            if node.state.removed {
                continue;
            }
            let target = auto.target;
            if cells[target.index()].is_async_without_hoistable(&cells) {
                return Err(AutowireError::Autowiring {
                    context: node_context(&name, node).argument(auto.method.clone()),
                    error: AutowiringError::AsyncAutoImplementation {
                        method: auto.method.clone(),
                        target: ids[target.index()].clone(),
                    },
                });
            }
            let (hoisted, plan) = hoisting
                .entry(target)
                .or_insert_with(|| hoist(&nodes[target.index()], target, &decorators));
            if hoisted.is_empty() {
                continue;
            }
            tracing::trace!(
                provider = %ids[index],
                target = %ids[target.index()],
                arguments = hoisted.len(),
                "Hoist async arguments"
            );
            let hoisted = hoisted.clone();
            let plan = Box::new(plan.clone());
            let state = &mut nodes[index].state;
            state.plan.hoisted = hoisted;
            if let Some(auto) = &mut state.plan.auto {
                auto.target_plan = Some(plan);
            }
        }

        let mut providers = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.into_iter().enumerate() {
            if node.state.removed {
                providers.push(None);
                continue;
            }
            let id = ProviderId::new(index);
            providers.push(Some(ResolvedProvider {
                id,
                is_async: flags.get(id)?,
                scope: node.state.scope,
                visits: node.state.visits,
                injected: node.state.injected,
                definition: node.definition,
                plan: node.state.plan,
            }));
        }
        Ok(ResolvedGraph {
            name,
            providers,
            decorators,
            index,
        })
    }
}

/// Read access to resolved async flags.
struct Flags<'a> {
    cells: &'a [AsyncCell],
    ids: &'a [String],
}

impl Flags<'_> {
    fn get(&self, id: ProviderId) -> Result<bool, AutowireError> {
        self.cells
            .get(id.index())
            .and_then(AsyncCell::get)
            .ok_or_else(|| {
                InternalError::PrematureAsyncRead {
                    provider: self.ids.get(id.index()).cloned().unwrap_or_default(),
                }
                .into()
            })
    }
}

fn bridge(injection: &mut Injection, flags: &Flags<'_>) -> Result<(), AutowireError> {
    let wants_async = injection.async_wanted;
    match &mut injection.value {
        InjectedValue::Providers(targets) => {
            for target in targets {
                target.bridging = Bridging::between(flags.get(target.provider)?, wants_async);
            }
        }
        InjectedValue::Tuple(slots) => {
            for slot in slots {
                bridge(slot, flags)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Moves the waiting factory and `decorate` arguments of `target` out of its
/// plan.
fn hoist(
    node: &Node,
    target: ProviderId,
    decorators: &[DecoratorDefinition],
) -> (Vec<HoistedArgument>, ProviderPlan) {
    let mut plan = node.state.plan.clone();
    let mut hoisted = Vec::new();
    for injection in &mut plan.factory {
        let name = format!("{}.{}", node.definition.id, injection.name);
        hoist_injection(injection, name, target, HoistOrigin::Factory, &mut hoisted);
    }
    for applied in &mut plan.decorators {
        let prefix = &decorators[applied.decorator.index()].id;
        for injection in &mut applied.decorate {
            let name = format!("{prefix}.{}", injection.name);
            let origin = HoistOrigin::Decorator(applied.decorator);
            hoist_injection(injection, name, target, origin, &mut hoisted);
        }
    }
    (hoisted, plan)
}

fn hoist_injection(
    injection: &mut Injection,
    name: String,
    target: ProviderId,
    origin: HoistOrigin,
    hoisted: &mut Vec<HoistedArgument>,
) {
    if !injection.waits() {
        return;
    }
    hoisted.push(HoistedArgument {
        name: name.clone(),
        target,
        origin,
        injection: injection.clone(),
    });
    injection.value = InjectedValue::Hoisted(name);
}

fn node_context(graph: &str, node: &Node) -> ErrorContext {
    ErrorContext::graph(graph)
        .provider(node.definition.id.clone())
        .location(node.definition.location.clone())
}

/// A graph whose every provider carries its final injection plan and async
/// flag.
#[derive(Debug)]
pub struct ResolvedGraph {
    name: String,
    providers: Vec<Option<ResolvedProvider>>,
    decorators: Vec<DecoratorDefinition>,
    index: CapabilityIndex,
}

#[derive(Clone, Debug)]
pub struct ResolvedProvider {
    pub id: ProviderId,
    pub definition: ProviderDefinition,
    /// Scope after decorator overrides.
    pub scope: Scope,
    pub is_async: bool,
    /// Number of times the engine resolved this provider's injection points.
    pub visits: usize,
    /// Targeted by an injector callback.
    pub injected: bool,
    pub plan: ProviderPlan,
}

impl ResolvedGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the provider with `id` unless it was removed as superseded.
    pub fn get(&self, id: ProviderId) -> Option<&ResolvedProvider> {
        self.providers.get(id.index()).and_then(Option::as_ref)
    }

    /// Looks a provider up by its declared id. Foreign providers are named
    /// `"<container>.<service>"`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use autowire::{Callable, Contracts, GraphAssembler, ProviderDefinition};
    ///
    /// let mut contracts = Contracts::new();
    /// let clock = contracts.declare("Clock");
    /// let mut assembler = GraphAssembler::new("app", &contracts);
    /// assembler
    ///     .add_provider(ProviderDefinition::factory("clock", clock, Callable::new("Clock::new")))
    ///     .unwrap();
    ///
    /// let graph = assembler.assemble().unwrap();
    /// assert!(!graph.find("clock").unwrap().is_async);
    /// assert!(graph.find("missing").is_none());
    /// ```
    pub fn find(&self, id: &str) -> Option<&ResolvedProvider> {
        self.iter().find(|v| v.definition.id == id)
    }

    /// Providers in declaration order, followed by foreign ones.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedProvider> {
        self.providers.iter().flatten()
    }

    /// Providers registered under `capability`, declared or aliased, in
    /// registration order.
    pub fn find_by_capability(
        &self,
        capability: CapabilityId,
    ) -> impl Iterator<Item = &ResolvedProvider> {
        self.index
            .find(capability)
            .iter()
            .filter_map(|v| self.get(*v))
    }

    pub fn decorator(&self, id: DecoratorId) -> &DecoratorDefinition {
        &self.decorators[id.index()]
    }

    pub fn decorators(&self) -> &[DecoratorDefinition] {
        &self.decorators
    }

    pub fn index(&self) -> &CapabilityIndex {
        &self.index
    }

    fn reflect(provider: &ResolvedProvider) -> ReflectedService {
        ReflectedService {
            id: provider.definition.id.clone(),
            capability: provider.definition.capability,
            aliases: provider.definition.aliases.clone(),
            is_async: provider.is_async,
        }
    }
}

impl ContainerReflection for ResolvedGraph {
    fn public_services(&self) -> Vec<ReflectedService> {
        self.iter()
            .filter(|v| v.definition.public)
            .map(Self::reflect)
            .collect()
    }

    fn dynamic_services(&self) -> Vec<ReflectedService> {
        self.iter()
            .filter(|v| v.definition.is_dynamic())
            .map(Self::reflect)
            .collect()
    }
}
