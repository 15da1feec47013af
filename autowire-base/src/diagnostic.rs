use std::fmt;

use autowire::{AutowireError, AutowiringError, DefinitionError, ResolvedGraph};

use crate::ManifestError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Note,
}

/// Human-readable outcome of an analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    /// Summary of a successful analysis.
    pub fn resolved(graph: &ResolvedGraph) -> Self {
        let services = graph.iter().count();
        let async_services = graph.iter().filter(|v| v.is_async).count();
        Self {
            severity: Severity::Note,
            message: format!(
                "graph {} resolved: {services} services, {async_services} async",
                graph.name()
            ),
            location: None,
            help: None,
        }
    }

    pub fn from_manifest(error: &ManifestError) -> Self {
        match error {
            ManifestError::Autowire(e) => Self::from_autowire(e),
            e => Self {
                severity: Severity::Error,
                message: e.to_string(),
                location: None,
                help: Some("fix the manifest and run the analysis again".into()),
            },
        }
    }

    pub fn from_autowire(error: &AutowireError) -> Self {
        let location = error
            .context()
            .and_then(|v| v.location.as_ref())
            .map(ToString::to_string);
        let help = match error {
            AutowireError::Internal(_) => {
                "this is a bug in autowire, please report it with the manifest".into()
            }
            AutowireError::CyclicDependency { .. } => {
                "break the cycle by consuming one of the services through an accessor".into()
            }
            AutowireError::Autowiring { error, .. } => autowiring_help(error),
            AutowireError::Definition { error, .. } => definition_help(error),
        };
        Self {
            severity: Severity::Error,
            message: error.to_string(),
            location,
            help: Some(help),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

fn autowiring_help(error: &AutowiringError) -> String {
    match error {
        AutowiringError::MissingCandidate { capability } => {
            format!("declare a provider of {capability} or make the argument optional")
        }
        AutowiringError::UnknownInjectorCapability { capability } => {
            format!("declare a dynamic provider of {capability}")
        }
        AutowiringError::AmbiguousCandidates { .. } => {
            "remove all but one provider or consume the argument as a list".into()
        }
        AutowiringError::ScopeViolation { .. } => {
            "consume the local service through an accessor or change the consumer's scope".into()
        }
        AutowiringError::AsyncIntoSyncConsumer { .. } => {
            "wrap the expected type in Future<..>".into()
        }
        AutowiringError::InjectorTargetNotDynamic { .. }
        | AutowiringError::InjectorTargetPrivate { .. }
        | AutowiringError::InjectorTargetForeign { .. } => {
            "injectors can only fill dynamic services of the same graph".into()
        }
        AutowiringError::TupleSlot { error, .. } => autowiring_help(error),
        AutowiringError::AmbiguousDynamicBinding { service, .. } => {
            format!("keep a single provider that can fill {service}")
        }
        AutowiringError::AsyncAutoImplementation { method, .. } => {
            format!("declare {method} as returning Future<..>")
        }
        AutowiringError::RequiresFactoryArguments { dependency } => {
            format!("obtain {dependency} through its auto-implemented factory")
        }
    }
}

fn definition_help(error: &DefinitionError) -> String {
    match error {
        DefinitionError::InvalidScope(_) => "use one of global, local or private".into(),
        DefinitionError::DuplicateId(_) => "give every service a unique id".into(),
        DefinitionError::UnsupportedSignature { .. } => "change the declared argument type".into(),
        DefinitionError::InvalidRestParameter { .. } => "declare the rest argument as Vec<..>".into(),
        DefinitionError::NotAutoImplementable { .. } => {
            "leave exactly one method of the contract unimplemented".into()
        }
        DefinitionError::ConflictingAutoImplementation { .. } => {
            "make both factory methods take the same arguments".into()
        }
        DefinitionError::ForeignDeclared(_) => "declare a container instead".into(),
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message)?,
            Severity::Note => write!(f, "note: {}", self.message)?,
        }
        if let Some(location) = &self.location {
            write!(f, "\n  --> {location}")?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  = help: {help}")?;
        }
        Ok(())
    }
}
