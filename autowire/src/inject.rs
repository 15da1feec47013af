//! Injection points and the plans the engine computes for them.
//!
//! The declared [`Signature`] of a parameter is unwrapped into a consumption
//! [`InjectionMode`] and a base capability. The resolved form of a parameter is
//! an [`Injection`], which tells the emitter exactly what to pass and how to
//! bridge between synchronous and asynchronous values.

use std::fmt;

use crate::{CapabilityId, ProviderId, Signature};

/// Consumption shape requested at an injection point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InjectionMode {
    Single,
    List,
    LazySequence,
    Accessor,
    InjectorCallback,
    Tuple,
    ScopedExecutionHandle,
}

impl InjectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InjectionMode::Single => "single",
            InjectionMode::List => "list",
            InjectionMode::LazySequence => "lazy-sequence",
            InjectionMode::Accessor => "accessor",
            InjectionMode::InjectorCallback => "injector-callback",
            InjectionMode::Tuple => "tuple",
            InjectionMode::ScopedExecutionHandle => "scoped-execution-handle",
        }
    }

    /// Whether more than one candidate is legal.
    pub fn accepts_many(self) -> bool {
        matches!(self, InjectionMode::List | InjectionMode::LazySequence)
    }

    /// Whether the value is obtained later rather than during construction.
    pub fn is_deferred(self) -> bool {
        matches!(self, InjectionMode::Accessor | InjectionMode::LazySequence)
    }
}

impl fmt::Display for InjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter between the synchronicity of a value and what its consumer wants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Bridging {
    #[default]
    None,
    /// The value is async but the consumer wants it directly.
    AwaitThenUse,
    /// The value is sync but the consumer wants an async value.
    WrapAsAsync,
}

impl Bridging {
    pub fn between(source_async: bool, wants_async: bool) -> Self {
        match (source_async, wants_async) {
            (true, false) => Bridging::AwaitThenUse,
            (false, true) => Bridging::WrapAsAsync,
            _ => Bridging::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bridging::None => "none",
            Bridging::AwaitThenUse => "await-then-use",
            Bridging::WrapAsAsync => "wrap-as-async",
        }
    }
}

/// One resolved candidate of an injection point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub provider: ProviderId,
    pub bridging: Bridging,
}

impl Target {
    pub(crate) fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            bridging: Bridging::None,
        }
    }
}

/// What is passed at an injection point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InjectedValue {
    /// No candidate; the consumer receives its default.
    Absent,
    Providers(Vec<Target>),
    /// Callback registering a value for a dynamic provider.
    Injector(ProviderId),
    Tuple(Vec<Injection>),
    /// Runs a callback inside a fresh local scope.
    ScopedExecution,
    /// Argument of the auto-implemented method at this position.
    Forwarded(usize),
    /// Reference to a value computed up front by an auto-implemented provider.
    Hoisted(String),
}

/// Resolved plan of one parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Injection {
    pub name: String,
    pub mode: InjectionMode,
    pub optional: bool,
    pub rest: bool,
    pub async_wanted: bool,
    pub value: InjectedValue,
}

impl Injection {
    pub fn targets(&self) -> &[Target] {
        match &self.value {
            InjectedValue::Providers(v) => v,
            _ => &[],
        }
    }

    /// Whether building this argument waits for an async value.
    pub fn waits(&self) -> bool {
        match &self.value {
            InjectedValue::Providers(targets) => targets
                .iter()
                .any(|v| v.bridging == Bridging::AwaitThenUse),
            InjectedValue::Tuple(slots) => slots.iter().any(Injection::waits),
            _ => false,
        }
    }
}

/// Result of unwrapping the modifiers of a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Unwrapped {
    pub mode: InjectionMode,
    pub capability: Option<CapabilityId>,
    pub optional: bool,
    pub async_wanted: bool,
    pub slots: Vec<Signature>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnwrapError {
    Unsupported(&'static str),
    InvalidRest,
}

impl Unwrapped {
    fn new(mode: InjectionMode, capability: Option<CapabilityId>) -> Self {
        Self {
            mode,
            capability,
            optional: false,
            async_wanted: false,
            slots: Vec::new(),
        }
    }
}

pub(crate) fn unwrap(signature: &Signature, rest: bool) -> Result<Unwrapped, UnwrapError> {
    let (optional, inner) = match signature {
        Signature::Optional(v) => (true, v.as_ref()),
        v => (false, v),
    };
    if rest && !matches!(inner, Signature::Array(_)) {
        return Err(UnwrapError::InvalidRest);
    }
    let mut unwrapped = match inner {
        Signature::Capability(id) => Unwrapped::new(InjectionMode::Single, Some(*id)),
        Signature::Deferred(v) => {
            let (optional, v) = strip_optional(v);
            let mut unwrapped = Unwrapped::new(InjectionMode::Single, Some(capability(v)?));
            unwrapped.async_wanted = true;
            unwrapped.optional = optional;
            unwrapped
        }
        Signature::Array(v) => element(InjectionMode::List, v)?,
        Signature::LazySequence(v) => element(InjectionMode::LazySequence, v)?,
        Signature::Callable { params, returns } if params.is_empty() => {
            let (async_wanted, returns) = strip_deferred(returns);
            let (optional, returns) = strip_optional(returns);
            let mut unwrapped =
                Unwrapped::new(InjectionMode::Accessor, Some(capability(returns)?));
            unwrapped.async_wanted = async_wanted;
            unwrapped.optional = optional;
            unwrapped
        }
        Signature::Callable { params, returns } if params.len() == 1 => {
            let (async_wanted, returns) = strip_deferred(returns);
            if *returns != Signature::Unit {
                return Err(UnwrapError::Unsupported("injector callbacks return nothing"));
            }
            let mut unwrapped =
                Unwrapped::new(InjectionMode::InjectorCallback, Some(capability(&params[0])?));
            unwrapped.async_wanted = async_wanted;
            unwrapped
        }
        Signature::Callable { .. } => {
            return Err(UnwrapError::Unsupported(
                "callables take no arguments (accessor) or one argument (injector)",
            ));
        }
        Signature::Tuple(items) => {
            if items.is_empty() {
                return Err(UnwrapError::Unsupported("empty tuple"));
            }
            let mut unwrapped = Unwrapped::new(InjectionMode::Tuple, None);
            unwrapped.slots = items.clone();
            unwrapped
        }
        Signature::ScopedExecution => Unwrapped::new(InjectionMode::ScopedExecutionHandle, None),
        Signature::Optional(_) => return Err(UnwrapError::Unsupported("nested Option")),
        Signature::Unit => return Err(UnwrapError::Unsupported("unit is not injectable")),
    };
    unwrapped.optional |= optional;
    Ok(unwrapped)
}

fn element(mode: InjectionMode, signature: &Signature) -> Result<Unwrapped, UnwrapError> {
    let (async_wanted, signature) = strip_deferred(signature);
    let mut unwrapped = Unwrapped::new(mode, Some(capability(signature)?));
    unwrapped.async_wanted = async_wanted;
    Ok(unwrapped)
}

fn strip_deferred(signature: &Signature) -> (bool, &Signature) {
    match signature {
        Signature::Deferred(v) => (true, v),
        v => (false, v),
    }
}

fn strip_optional(signature: &Signature) -> (bool, &Signature) {
    match signature {
        Signature::Optional(v) => (true, v),
        v => (false, v),
    }
}

fn capability(signature: &Signature) -> Result<CapabilityId, UnwrapError> {
    match signature {
        Signature::Capability(id) => Ok(*id),
        _ => Err(UnwrapError::Unsupported("expected a capability")),
    }
}
