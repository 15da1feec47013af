//! Declared provider and decorator definitions.
//!
//! These are the records handed over by the discovery step. The engine never
//! mutates them; everything it derives lives next to them in the
//! [`DefinitionGraph`](crate::DefinitionGraph) arena.

use std::fmt;
use std::str::FromStr;

use crate::{CapabilityId, ContainerReflection, DefinitionError, ReflectedGraph, Signature};

/// Stable index of a provider in the definition arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(usize);

impl ProviderId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Stable index of a decorator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratorId(usize);

impl DecoratorId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Sharing and lifetime policy of a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// One instance per graph lifetime.
    #[default]
    Global,
    /// One instance per fork, created on first use inside it.
    Local,
    /// A fresh instance for every injection point.
    Private,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Local => "local",
            Scope::Private => "private",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Scope::Global),
            "local" => Ok(Scope::Local),
            "private" => Ok(Scope::Private),
            _ => Err(DefinitionError::InvalidScope(s.to_owned())),
        }
    }
}

/// Where a definition was declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One formal parameter of a factory or hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub signature: Signature,
    /// Collects a variadic tail. Must be declared as `Vec<T>`.
    pub rest: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            rest: false,
        }
    }

    pub fn rest(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            rest: true,
        }
    }
}

/// A factory, decorator or hook function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callable {
    pub name: String,
    pub params: Vec<Param>,
    pub is_async: bool,
}

impl Callable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            is_async: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.params.push(Param::new(name, signature));
        self
    }

    pub fn rest(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.params.push(Param::rest(name, signature));
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// Lifecycle hooks of a provider or decorator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hooks {
    pub on_create: Option<Callable>,
    pub on_fork: Option<Callable>,
    pub on_destroy: Option<Callable>,
}

impl Hooks {
    pub fn iter(&self) -> impl Iterator<Item = (HookKind, &Callable)> {
        [
            (HookKind::OnCreate, self.on_create.as_ref()),
            (HookKind::OnFork, self.on_fork.as_ref()),
            (HookKind::OnDestroy, self.on_destroy.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, hook)| hook.map(|v| (kind, v)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    OnCreate,
    OnFork,
    OnDestroy,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::OnCreate => "onCreate",
            HookKind::OnFork => "onFork",
            HookKind::OnDestroy => "onDestroy",
        }
    }
}

/// How a provider produces its value.
#[derive(Clone, Debug)]
pub enum ProviderKind {
    Factory(Callable),
    /// Supplied externally at run time. Never auto-resolved.
    Dynamic,
    /// Synthesized implementation of an abstract contract with exactly one
    /// unimplemented method.
    AutoImplemented,
    /// A factory producing a nested graph whose public surface is merged
    /// into the enclosing graph.
    Container {
        factory: Callable,
        reflection: ReflectedGraph,
    },
    /// A public service of a nested graph, imported during merging.
    Foreign {
        container: ProviderId,
        service: String,
        is_async: bool,
    },
}

impl ProviderKind {
    pub fn factory(&self) -> Option<&Callable> {
        match self {
            ProviderKind::Factory(v) => Some(v),
            ProviderKind::Container { factory, .. } => Some(factory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Factory(_) => "factory",
            ProviderKind::Dynamic => "dynamic",
            ProviderKind::AutoImplemented => "auto-implemented",
            ProviderKind::Container { .. } => "container",
            ProviderKind::Foreign { .. } => "foreign",
        }
    }
}

/// Something that can produce a service instance.
#[derive(Clone, Debug)]
pub struct ProviderDefinition {
    pub id: String,
    pub capability: CapabilityId,
    pub aliases: Vec<CapabilityId>,
    pub kind: ProviderKind,
    pub scope: Scope,
    pub hooks: Hooks,
    /// Part of the graph's public surface.
    pub public: bool,
    /// Declared explicitly rather than inferred from a type declaration.
    pub explicit: bool,
    pub location: Option<SourceLocation>,
}

impl ProviderDefinition {
    fn with_kind(id: impl Into<String>, capability: CapabilityId, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            capability,
            aliases: Vec::new(),
            kind,
            scope: Scope::Global,
            hooks: Hooks::default(),
            public: false,
            explicit: true,
            location: None,
        }
    }

    /// Creates an explicit global provider constructed by calling `factory`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use autowire::{Callable, Contracts, ProviderDefinition, Scope, Signature};
    ///
    /// let mut contracts = Contracts::new();
    /// let config = contracts.declare("Config");
    /// let pool = contracts.declare("Pool");
    ///
    /// let definition = ProviderDefinition::factory(
    ///     "pool",
    ///     pool,
    ///     Callable::new("Pool::connect").param("config", Signature::of(config)),
    /// )
    /// .public();
    /// assert_eq!(definition.scope, Scope::Global);
    /// assert!(definition.explicit);
    /// ```
    pub fn factory(id: impl Into<String>, capability: CapabilityId, factory: Callable) -> Self {
        Self::with_kind(id, capability, ProviderKind::Factory(factory))
    }

    /// Creates a provider whose value is registered at run time instead of
    /// being constructed by the graph.
    pub fn dynamic(id: impl Into<String>, capability: CapabilityId) -> Self {
        Self::with_kind(id, capability, ProviderKind::Dynamic)
    }

    /// Creates a provider of an abstract contract whose single abstract
    /// method is synthesized to construct the provider it returns.
    ///
    /// The method's parameters are forwarded to the matching factory
    /// parameters of that provider.
    pub fn auto_implemented(id: impl Into<String>, capability: CapabilityId) -> Self {
        Self::with_kind(id, capability, ProviderKind::AutoImplemented)
    }

    /// A provider whose value is a nested graph described by `reflection`.
    pub fn container(
        id: impl Into<String>,
        capability: CapabilityId,
        factory: Callable,
        reflection: &dyn ContainerReflection,
    ) -> Self {
        Self::with_kind(
            id,
            capability,
            ProviderKind::Container {
                factory,
                reflection: ReflectedGraph::capture(reflection),
            },
        )
    }

    /// Registers the provider under one more capability. Aliases equal to
    /// the declared capability or already present are ignored.
    pub fn alias(mut self, capability: CapabilityId) -> Self {
        if capability != self.capability && !self.aliases.contains(&capability) {
            self.aliases.push(capability);
        }
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Exposes the provider to graphs that nest this one.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Marks the definition as inferred. It is dropped when an explicit
    /// definition of the same capability exists.
    pub fn implicit(mut self) -> Self {
        self.explicit = false;
        self
    }

    pub fn on_create(mut self, hook: Callable) -> Self {
        self.hooks.on_create = Some(hook);
        self
    }

    pub fn on_fork(mut self, hook: Callable) -> Self {
        self.hooks.on_fork = Some(hook);
        self
    }

    pub fn on_destroy(mut self, hook: Callable) -> Self {
        self.hooks.on_destroy = Some(hook);
        self
    }

    /// Attaches the source location reported with errors about this
    /// provider.
    pub fn located(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Declared capability followed by aliases.
    pub fn capabilities(&self) -> impl Iterator<Item = CapabilityId> + '_ {
        std::iter::once(self.capability).chain(self.aliases.iter().copied())
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, ProviderKind::Dynamic)
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ProviderKind::Container { .. })
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self.kind, ProviderKind::Foreign { .. })
    }
}

/// Cross-cutting modifier applied to every provider of a capability.
#[derive(Clone, Debug)]
pub struct DecoratorDefinition {
    pub id: String,
    pub target: CapabilityId,
    /// Higher runs first on construction and last on teardown.
    pub priority: i32,
    /// The first parameter receives the decorated instance.
    pub decorate: Option<Callable>,
    pub hooks: Hooks,
    pub scope: Option<Scope>,
    pub location: Option<SourceLocation>,
}

impl DecoratorDefinition {
    /// Creates a decorator of every provider of `target` with priority 0.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use autowire::{Callable, Contracts, DecoratorDefinition, Scope, Signature};
    ///
    /// let mut contracts = Contracts::new();
    /// let handler = contracts.declare("Handler");
    ///
    /// let decorator = DecoratorDefinition::new("traced", handler)
    ///     .priority(10)
    ///     .decorate(Callable::new("trace").param("handler", Signature::of(handler)))
    ///     .scope(Scope::Local);
    /// assert!(decorator.decorate_params().is_empty());
    /// ```
    pub fn new(id: impl Into<String>, target: CapabilityId) -> Self {
        Self {
            id: id.into(),
            target,
            priority: 0,
            decorate: None,
            hooks: Hooks::default(),
            scope: None,
            location: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn decorate(mut self, decorate: Callable) -> Self {
        self.decorate = Some(decorate);
        self
    }

    pub fn on_create(mut self, hook: Callable) -> Self {
        self.hooks.on_create = Some(hook);
        self
    }

    pub fn on_fork(mut self, hook: Callable) -> Self {
        self.hooks.on_fork = Some(hook);
        self
    }

    pub fn on_destroy(mut self, hook: Callable) -> Self {
        self.hooks.on_destroy = Some(hook);
        self
    }

    /// Overrides the scope of decorated providers. The highest priority
    /// decorator declaring a scope wins.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn located(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Injection points of `decorate`, without the decorated instance.
    pub fn decorate_params(&self) -> &[Param] {
        self.decorate
            .as_ref()
            .and_then(|v| v.params.get(1..))
            .unwrap_or_default()
    }
}
