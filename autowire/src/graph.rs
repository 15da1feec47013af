use std::collections::HashMap;

use crate::asynchrony::AsyncCell;
use crate::foreign::SubRegistration;
use crate::{
    AutowireError, Bridging, CapabilityIndex, DecoratorDefinition, DecoratorId, DefinitionError,
    ErrorContext, HookKind, Injection, InjectionMode, ProviderDefinition, ProviderId, Scope,
    Signature,
};

/// Arena of every provider of one graph together with the state the engine
/// derives for it.
#[derive(Debug)]
pub struct DefinitionGraph {
    name: String,
    nodes: Vec<Node>,
    decorators: Vec<DecoratorDefinition>,
    index: CapabilityIndex,
    ids: HashMap<String, ProviderId>,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub definition: ProviderDefinition,
    pub state: NodeState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Visit {
    #[default]
    NotVisited,
    InProgress,
    Done,
}

#[derive(Debug, Default)]
pub(crate) struct NodeState {
    pub visit: Visit,
    pub visits: usize,
    /// Superseded by an explicit definition during cleanup.
    pub removed: bool,
    /// Declared scope, possibly overridden by a decorator.
    pub scope: Scope,
    /// Attached decorators, highest priority first.
    pub decorators: Vec<DecoratorId>,
    /// Factory parameters supplied by the auto-implemented method that
    /// creates this provider.
    pub forwarded: Option<Vec<Signature>>,
    pub bindings: Vec<SubRegistration>,
    /// Targeted by at least one injector callback.
    pub injected: bool,
    pub plan: ProviderPlan,
    pub asynchrony: AsyncCell,
    pub constraints: Vec<SyncConstraint>,
}

/// A deferred consumer that must not receive an async value.
#[derive(Clone, Debug)]
pub(crate) struct SyncConstraint {
    pub argument: String,
    pub dependency: ProviderId,
    pub mode: InjectionMode,
}

/// Everything needed to construct one provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderPlan {
    pub factory: Vec<Injection>,
    pub hooks: Vec<HookPlan>,
    pub decorators: Vec<AppliedDecorator>,
    /// Dynamic services of a nested graph filled from this graph.
    pub registrations: Vec<Injection>,
    pub auto: Option<AutoImplementation>,
    pub hoisted: Vec<HoistedArgument>,
}

impl ProviderPlan {
    pub(crate) fn injections_mut(&mut self) -> impl Iterator<Item = &mut Injection> {
        self.factory
            .iter_mut()
            .chain(self.hooks.iter_mut().flat_map(|v| v.args.iter_mut()))
            .chain(self.decorators.iter_mut().flat_map(|v| {
                v.decorate
                    .iter_mut()
                    .chain(v.hooks.iter_mut().flat_map(|v| v.args.iter_mut()))
            }))
            .chain(self.registrations.iter_mut())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookPlan {
    pub kind: HookKind,
    pub args: Vec<Injection>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedDecorator {
    pub decorator: DecoratorId,
    pub decorate: Vec<Injection>,
    pub hooks: Vec<HookPlan>,
}

/// Synthesized method of an auto-implemented provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoImplementation {
    pub method: String,
    pub target: ProviderId,
    pub async_method: bool,
    /// Bridging between the target and the `Future` returned by an async
    /// method.
    pub bridging: Bridging,
    /// Plan the method creates the target with, when arguments of the target
    /// were hoisted out of it.
    pub target_plan: Option<Box<ProviderPlan>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoistOrigin {
    Factory,
    Decorator(DecoratorId),
}

/// Async argument of an auto-implementation target, awaited once when the
/// auto-implemented provider is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoistedArgument {
    pub name: String,
    pub target: ProviderId,
    pub origin: HoistOrigin,
    pub injection: Injection,
}

impl DefinitionGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            decorators: Vec::new(),
            index: CapabilityIndex::new(),
            ids: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn definition(&self, id: ProviderId) -> &ProviderDefinition {
        &self.nodes[id.index()].definition
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderDefinition> {
        self.nodes
            .get(id.index())
            .filter(|v| !v.state.removed)
            .map(|v| &v.definition)
    }

    pub fn find(&self, id: &str) -> Option<ProviderId> {
        self.ids
            .get(id)
            .copied()
            .filter(|v| !self.nodes[v.index()].state.removed)
    }

    /// Every definition that has not been superseded, in insertion order.
    pub fn providers(&self) -> impl Iterator<Item = (ProviderId, &ProviderDefinition)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.state.removed)
            .map(|(i, v)| (ProviderId::new(i), &v.definition))
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

    /// Scope after decorator overrides.
    pub fn scope(&self, id: ProviderId) -> Scope {
        self.nodes[id.index()].state.scope
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn insert(
        &mut self,
        definition: ProviderDefinition,
    ) -> Result<ProviderId, AutowireError> {
        if self.ids.contains_key(&definition.id) {
            return Err(AutowireError::Definition {
                context: ErrorContext::graph(&self.name).location(definition.location.clone()),
                error: DefinitionError::DuplicateId(definition.id),
            });
        }
        let id = ProviderId::new(self.nodes.len());
        for capability in definition.capabilities() {
            self.index.register(capability, id);
        }
        self.ids.insert(definition.id.clone(), id);
        let state = NodeState {
            scope: definition.scope,
            ..Default::default()
        };
        self.nodes.push(Node { definition, state });
        Ok(id)
    }

    pub(crate) fn insert_decorator(&mut self, definition: DecoratorDefinition) -> DecoratorId {
        let id = DecoratorId::new(self.decorators.len());
        self.decorators.push(definition);
        id
    }

    /// Tombstones `id` and removes it from the index.
    pub(crate) fn remove(&mut self, id: ProviderId) {
        self.index.remove(id);
        self.nodes[id.index()].state.removed = true;
    }

    pub(crate) fn state(&self, id: ProviderId) -> &NodeState {
        &self.nodes[id.index()].state
    }

    pub(crate) fn state_mut(&mut self, id: ProviderId) -> &mut NodeState {
        &mut self.nodes[id.index()].state
    }

    pub(crate) fn context(&self, id: ProviderId) -> ErrorContext {
        let definition = self.definition(id);
        ErrorContext::graph(&self.name)
            .provider(definition.id.clone())
            .location(definition.location.clone())
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Node>, Vec<DecoratorDefinition>, CapabilityIndex) {
        (self.name, self.nodes, self.decorators, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Callable, Contracts};

    #[test]
    fn test_insert_and_remove() {
        let mut contracts = Contracts::new();
        let logger = contracts.declare("Logger");
        let sink = contracts.declare("Sink");
        let mut graph = DefinitionGraph::new("app");
        let a = graph
            .insert(ProviderDefinition::factory("a", logger, Callable::new("a")).alias(sink))
            .unwrap();
        let b = graph
            .insert(ProviderDefinition::dynamic("b", logger))
            .unwrap();
        assert_eq!(graph.index().find(logger), &[a, b]);
        assert_eq!(graph.find("a"), Some(a));

        graph.remove(a);
        assert_eq!(graph.index().find(logger), &[b]);
        assert!(graph.index().find(sink).is_empty());
        assert_eq!(graph.find("a"), None);
        assert_eq!(graph.providers().count(), 1);
    }

    #[test]
    fn test_duplicate_id() {
        let mut contracts = Contracts::new();
        let logger = contracts.declare("Logger");
        let mut graph = DefinitionGraph::new("app");
        graph.insert(ProviderDefinition::dynamic("a", logger)).unwrap();
        let error = graph
            .insert(ProviderDefinition::dynamic("a", logger))
            .unwrap_err();
        assert!(matches!(
            error,
            AutowireError::Definition {
                error: DefinitionError::DuplicateId(v),
                ..
            } if v == "a"
        ));
    }
}
