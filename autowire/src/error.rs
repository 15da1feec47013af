use std::fmt;

use crate::{InjectionMode, SourceLocation};

/// Errors raised while assembling a graph.
///
/// Every variant except [`AutowireError::Internal`] is caused by the input
/// declarations and can only be fixed by changing them.
#[derive(Debug)]
pub enum AutowireError {
    /// An injection point can not be satisfied.
    Autowiring {
        context: ErrorContext,
        error: AutowiringError,
    },
    /// A chain of non-deferred dependencies returns to its start.
    CyclicDependency { graph: String, chain: Vec<String> },
    /// A declaration is malformed.
    Definition {
        context: ErrorContext,
        error: DefinitionError,
    },
    /// The engine violated one of its own invariants.
    Internal(InternalError),
}

impl AutowireError {
    pub fn is_internal(&self) -> bool {
        matches!(self, AutowireError::Internal(_))
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AutowireError::Autowiring { context, .. } => Some(context),
            AutowireError::Definition { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl fmt::Display for AutowireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutowireError::Autowiring { context, error } => write!(f, "{context}: {error}"),
            AutowireError::CyclicDependency { graph, chain } => {
                write!(f, "graph {graph}: cyclic dependency detected: ")?;
                for id in chain {
                    write!(f, "{id} -> ")?;
                }
                match chain.first() {
                    Some(first) => write!(f, "{first}"),
                    None => Ok(()),
                }
            }
            AutowireError::Definition { context, error } => write!(f, "{context}: {error}"),
            AutowireError::Internal(e) => write!(f, "Internal error: {e}"),
        }
    }
}

impl std::error::Error for AutowireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutowireError::Autowiring { error, .. } => Some(error),
            AutowireError::Definition { error, .. } => Some(error),
            AutowireError::Internal(e) => Some(e),
            AutowireError::CyclicDependency { .. } => None,
        }
    }
}

impl From<InternalError> for AutowireError {
    fn from(value: InternalError) -> Self {
        Self::Internal(value)
    }
}

/// Where an error happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub graph: String,
    pub provider: Option<String>,
    pub argument: Option<String>,
    pub location: Option<SourceLocation>,
}

impl ErrorContext {
    pub fn graph(graph: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            ..Default::default()
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    pub fn location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph {}", self.graph)?;
        if let Some(provider) = &self.provider {
            write!(f, ", service {provider}")?;
        }
        if let Some(argument) = &self.argument {
            write!(f, ", argument {argument}")?;
        }
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AutowiringError {
    MissingCandidate {
        capability: String,
    },
    UnknownInjectorCapability {
        capability: String,
    },
    AmbiguousCandidates {
        capability: String,
        candidates: Vec<String>,
    },
    ScopeViolation {
        dependency: String,
    },
    AsyncIntoSyncConsumer {
        dependency: String,
        mode: InjectionMode,
    },
    InjectorTargetNotDynamic {
        dependency: String,
    },
    InjectorTargetPrivate {
        dependency: String,
    },
    InjectorTargetForeign {
        dependency: String,
    },
    TupleSlot {
        index: usize,
        error: Box<AutowiringError>,
    },
    AmbiguousDynamicBinding {
        service: String,
        capability: String,
        candidates: Vec<String>,
    },
    AsyncAutoImplementation {
        method: String,
        target: String,
    },
    RequiresFactoryArguments {
        dependency: String,
    },
}

impl fmt::Display for AutowiringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutowiringError::MissingCandidate { capability } => {
                write!(f, "Unable to autowire non-optional argument of type {capability}")
            }
            AutowiringError::UnknownInjectorCapability { capability } => {
                write!(f, "Unknown capability {capability} in injector")
            }
            AutowiringError::AmbiguousCandidates {
                capability,
                candidates,
            } => write!(
                f,
                "Multiple providers of matching capability {capability} found: {}",
                candidates.join(", ")
            ),
            AutowiringError::ScopeViolation { dependency } => write!(
                f,
                "Cannot inject locally-scoped dependency {dependency} into globally-scoped service"
            ),
            AutowiringError::AsyncIntoSyncConsumer { dependency, mode } => write!(
                f,
                "Cannot inject async dependency {dependency} into a synchronous {mode}"
            ),
            AutowiringError::InjectorTargetNotDynamic { dependency } => {
                write!(f, "Cannot inject injector for non-dynamic service {dependency}")
            }
            AutowiringError::InjectorTargetPrivate { dependency } => {
                write!(f, "Cannot inject injector for privately-scoped service {dependency}")
            }
            AutowiringError::InjectorTargetForeign { dependency } => {
                write!(f, "Cannot inject injector for foreign service {dependency}")
            }
            AutowiringError::TupleSlot { index, error } => {
                write!(f, "Tuple slot #{index}: {error}")
            }
            AutowiringError::AmbiguousDynamicBinding {
                service,
                capability,
                candidates,
            } => write!(
                f,
                "Multiple providers of capability {capability} can satisfy dynamic service {service}: {}",
                candidates.join(", ")
            ),
            AutowiringError::AsyncAutoImplementation { method, target } => write!(
                f,
                "Synchronous method {method} cannot create {target} because its construction is async"
            ),
            AutowiringError::RequiresFactoryArguments { dependency } => write!(
                f,
                "Service {dependency} requires arguments of its auto-implemented factory and cannot be injected directly"
            ),
        }
    }
}

impl std::error::Error for AutowiringError {}

#[derive(Debug, PartialEq, Eq)]
pub enum DefinitionError {
    InvalidScope(String),
    DuplicateId(String),
    UnsupportedSignature {
        signature: String,
        reason: &'static str,
    },
    InvalidRestParameter {
        signature: String,
    },
    NotAutoImplementable {
        contract: String,
    },
    ConflictingAutoImplementation {
        target: String,
    },
    /// Foreign definitions are only created by merging nested graphs.
    ForeignDeclared(String),
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::InvalidScope(v) => write!(f, "Invalid scope: {v:?}"),
            DefinitionError::DuplicateId(v) => write!(f, "Duplicate service id: {v}"),
            DefinitionError::UnsupportedSignature { signature, reason } => {
                write!(f, "Unsupported signature {signature}: {reason}")
            }
            DefinitionError::InvalidRestParameter { signature } => {
                write!(f, "Rest parameter must be declared as Vec<T>, got {signature}")
            }
            DefinitionError::NotAutoImplementable { contract } => write!(
                f,
                "Contract {contract} must be abstract with exactly one unimplemented method"
            ),
            DefinitionError::ConflictingAutoImplementation { target } => write!(
                f,
                "Service {target} is created by auto-implemented factories with different arguments"
            ),
            DefinitionError::ForeignDeclared(v) => {
                write!(f, "Service {v} can not be declared as foreign")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Violations of the engine's own invariants.
#[derive(Debug, PartialEq, Eq)]
pub enum InternalError {
    /// An async flag was read before the asynchrony phase resolved it.
    PrematureAsyncRead { provider: String },
    /// The dependency chain was popped out of order.
    ChainMismatch {
        expected: String,
        actual: Option<String>,
    },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalError::PrematureAsyncRead { provider } => {
                write!(f, "Async flag of {provider} read before it was resolved")
            }
            InternalError::ChainMismatch { expected, actual } => write!(
                f,
                "Dependency chain popped out of order: expected {expected}, got {}",
                actual.as_deref().unwrap_or("nothing")
            ),
        }
    }
}

impl std::error::Error for InternalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let error = AutowireError::CyclicDependency {
            graph: "app".into(),
            chain: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(
            error.to_string(),
            "graph app: cyclic dependency detected: a -> b -> c -> a"
        );
        assert!(!error.is_internal());
    }

    #[test]
    fn test_context_display() {
        let context = ErrorContext::graph("app")
            .provider("api")
            .argument("db")
            .location(Some(SourceLocation {
                file: "src/api.rs".into(),
                line: 4,
                column: 1,
            }));
        assert_eq!(
            context.to_string(),
            "graph app, service api, argument db (src/api.rs:4:1)"
        );
    }
}
