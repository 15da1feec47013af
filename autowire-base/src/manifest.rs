//! Declarative description of a graph.
//!
//! A manifest is a JSON document listing contracts, providers and
//! decorators. Types of injection points are written in Rust type syntax and
//! name contracts by their key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use autowire::{
    AutowireError, Callable, CapabilityId, Contracts, DecoratorDefinition, DefinitionError, Hooks,
    Method, ProviderDefinition, Scope, Signature, SourceLocation,
};
use serde::{Deserialize, Serialize};

use crate::{SignatureError, StdError, parse_signature};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    /// Contracts by key. Keys are what signatures refer to.
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractDecl>,
    #[serde(default)]
    pub providers: Vec<ProviderDecl>,
    #[serde(default)]
    pub decorators: Vec<DecoratorDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDecl {
    /// Display name, defaults to the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodDecl>,
}

impl ContractDecl {
    fn is_abstract(&self) -> bool {
        self.is_abstract || !self.methods.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "unit_type")]
    pub returns: String,
    #[serde(default)]
    pub implemented: bool,
}

fn unit_type() -> String {
    "()".into()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDecl {
    pub id: String,
    pub capability: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub factory: Option<CallableDecl>,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub auto_implement: bool,
    /// Makes the provider a container of the referenced graph.
    #[serde(default)]
    pub container: Option<ContainerRef>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub hooks: HooksDecl,
    #[serde(default)]
    pub public: bool,
    /// Inferred from a type declaration and replaced by any explicit
    /// provider of the same capability.
    #[serde(default)]
    pub implicit: bool,
    #[serde(default)]
    pub location: Option<LocationDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratorDecl {
    pub id: String,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub decorate: Option<CallableDecl>,
    #[serde(default)]
    pub hooks: HooksDecl,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub location: Option<LocationDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub rest: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HooksDecl {
    #[serde(default)]
    pub on_create: Option<CallableDecl>,
    #[serde(default)]
    pub on_fork: Option<CallableDecl>,
    #[serde(default)]
    pub on_destroy: Option<CallableDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRef {
    /// Another manifest, analyzed in the same run.
    Manifest(PathBuf),
    /// A report written by an earlier run.
    Report(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDecl {
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl From<&LocationDecl> for SourceLocation {
    fn from(value: &LocationDecl) -> Self {
        SourceLocation {
            file: value.file.clone(),
            line: value.line,
            column: value.column,
        }
    }
}

impl Manifest {
    pub fn parse<T>(text: T) -> Result<Self, ManifestError>
    where
        T: AsRef<str>,
    {
        serde_json::from_str(text.as_ref()).map_err(|error| ManifestError::Parse { path: None, error })
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| ManifestError::Io {
                path: path.to_owned(),
                error,
            })?;
        serde_json::from_str(&text).map_err(|error| ManifestError::Parse {
            path: Some(path.to_owned()),
            error,
        })
    }
}

/// Contracts shared by every graph of one analysis, addressable by key.
#[derive(Debug, Default)]
pub struct ContractTable {
    contracts: Contracts,
    keys: BTreeMap<String, CapabilityId>,
    /// Keys indexed by capability.
    names: Vec<String>,
    declarations: BTreeMap<String, ContractDecl>,
}

impl ContractTable {
    /// Declares every contract of `declarations`.
    ///
    /// Contracts are declared before any method is parsed, so methods may
    /// mention contracts declared later in the map.
    pub fn new(declarations: BTreeMap<String, ContractDecl>) -> Result<Self, ManifestError> {
        let mut table = Self::default();
        for (key, decl) in &declarations {
            let name = decl.name.clone().unwrap_or_else(|| key.clone());
            let id = if decl.is_abstract() {
                table.contracts.declare_abstract(name, Vec::new())
            } else {
                table.contracts.declare(name)
            };
            table.keys.insert(key.clone(), id);
            table.names.push(key.clone());
        }
        for (key, decl) in &declarations {
            if !decl.is_abstract() {
                continue;
            }
            let mut methods = Vec::with_capacity(decl.methods.len());
            for method in &decl.methods {
                let owner = || format!("contract {key}, method {}", method.name);
                let mut parsed = Method::new(&method.name, table.parse(&method.returns, owner)?);
                for param in &method.params {
                    parsed = parsed.param(table.parse(param, owner)?);
                }
                if method.implemented {
                    parsed = parsed.implemented();
                }
                methods.push(parsed);
            }
            let id = table.keys[key];
            table.contracts.define_methods(id, methods);
        }
        table.declarations = declarations;
        Ok(table)
    }

    pub fn contracts(&self) -> &Contracts {
        &self.contracts
    }

    pub fn declarations(&self) -> &BTreeMap<String, ContractDecl> {
        &self.declarations
    }

    pub fn lookup(&self, key: &str) -> Option<CapabilityId> {
        self.keys.get(key).copied()
    }

    pub fn key(&self, id: CapabilityId) -> &str {
        self.names.get(id.index()).map_or("<unknown>", String::as_str)
    }

    pub fn capability(&self, key: &str) -> Result<CapabilityId, ManifestError> {
        self.lookup(key)
            .ok_or_else(|| ManifestError::UnknownContract(key.to_owned()))
    }

    fn parse(&self, text: &str, owner: impl Fn() -> String) -> Result<Signature, ManifestError> {
        parse_signature(text, |v| self.lookup(v)).map_err(|error| ManifestError::Signature {
            owner: owner(),
            error,
        })
    }

    pub(crate) fn callable(&self, decl: &CallableDecl, owner: &str) -> Result<Callable, ManifestError> {
        let mut callable = Callable::new(&decl.name);
        for param in &decl.params {
            let signature = self.parse(&param.ty, || format!("{owner}, argument {}", param.name))?;
            callable = if param.rest {
                callable.rest(&param.name, signature)
            } else {
                callable.param(&param.name, signature)
            };
        }
        if decl.is_async {
            callable = callable.asynchronous();
        }
        Ok(callable)
    }

    fn hooks(&self, decl: &HooksDecl, owner: &str) -> Result<Hooks, ManifestError> {
        let hook = |v: &Option<CallableDecl>, kind: &str| {
            v.as_ref()
                .map(|v| self.callable(v, &format!("{owner}, hook {kind}")))
                .transpose()
        };
        Ok(Hooks {
            on_create: hook(&decl.on_create, "onCreate")?,
            on_fork: hook(&decl.on_fork, "onFork")?,
            on_destroy: hook(&decl.on_destroy, "onDestroy")?,
        })
    }

    /// Builds the definition of a non-container provider.
    pub(crate) fn provider(&self, decl: &ProviderDecl) -> Result<ProviderDefinition, ManifestError> {
        let capability = self.capability(&decl.capability)?;
        let owner = format!("service {}", decl.id);
        let invalid = |reason| ManifestError::InvalidProvider {
            id: decl.id.clone(),
            reason,
        };
        let definition = match (&decl.factory, decl.dynamic, decl.auto_implement) {
            (Some(factory), false, false) => {
                ProviderDefinition::factory(&decl.id, capability, self.callable(factory, &owner)?)
            }
            (None, true, false) => ProviderDefinition::dynamic(&decl.id, capability),
            (None, false, true) => ProviderDefinition::auto_implemented(&decl.id, capability),
            (None, false, false) => return Err(invalid("a factory is required")),
            _ => return Err(invalid("factory, dynamic and auto_implement are exclusive")),
        };
        self.finish_provider(definition, decl)
    }

    /// Builds the definition of a container provider.
    pub(crate) fn container(
        &self,
        decl: &ProviderDecl,
        reflection: &dyn autowire::ContainerReflection,
    ) -> Result<ProviderDefinition, ManifestError> {
        let capability = self.capability(&decl.capability)?;
        let Some(factory) = &decl.factory else {
            return Err(ManifestError::InvalidProvider {
                id: decl.id.clone(),
                reason: "a container requires a factory",
            });
        };
        if decl.dynamic || decl.auto_implement {
            return Err(ManifestError::InvalidProvider {
                id: decl.id.clone(),
                reason: "a container can not be dynamic or auto-implemented",
            });
        }
        let factory = self.callable(factory, &format!("service {}", decl.id))?;
        let definition = ProviderDefinition::container(&decl.id, capability, factory, reflection);
        self.finish_provider(definition, decl)
    }

    fn finish_provider(
        &self,
        mut definition: ProviderDefinition,
        decl: &ProviderDecl,
    ) -> Result<ProviderDefinition, ManifestError> {
        let owner = format!("service {}", decl.id);
        for alias in &decl.aliases {
            definition = definition.alias(self.capability(alias)?);
        }
        if let Some(scope) = &decl.scope {
            definition = definition.scope(parse_scope(scope, &owner)?);
        }
        definition.hooks = self.hooks(&decl.hooks, &owner)?;
        if decl.public {
            definition = definition.public();
        }
        if decl.implicit {
            definition = definition.implicit();
        }
        if let Some(location) = &decl.location {
            definition = definition.located(location.into());
        }
        Ok(definition)
    }

    pub(crate) fn decorator(&self, decl: &DecoratorDecl) -> Result<DecoratorDefinition, ManifestError> {
        let owner = format!("decorator {}", decl.id);
        let mut definition =
            DecoratorDefinition::new(&decl.id, self.capability(&decl.target)?).priority(decl.priority);
        if let Some(decorate) = &decl.decorate {
            definition = definition.decorate(self.callable(decorate, &owner)?);
        }
        definition.hooks = self.hooks(&decl.hooks, &owner)?;
        if let Some(scope) = &decl.scope {
            definition = definition.scope(parse_scope(scope, &owner)?);
        }
        if let Some(location) = &decl.location {
            definition = definition.located(location.into());
        }
        Ok(definition)
    }
}

fn parse_scope(text: &str, owner: &str) -> Result<Scope, ManifestError> {
    text.parse().map_err(|error| ManifestError::Definition {
        owner: owner.to_owned(),
        error,
    })
}

/// Merges contract declarations, rejecting a key declared twice differently.
pub(crate) fn merge_contracts(
    into: &mut BTreeMap<String, ContractDecl>,
    from: &BTreeMap<String, ContractDecl>,
) -> Result<(), ManifestError> {
    for (key, decl) in from {
        match into.get(key) {
            Some(existing) if existing != decl => {
                return Err(ManifestError::ConflictingContract(key.clone()));
            }
            Some(_) => {}
            None => {
                into.insert(key.clone(), decl.clone());
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum ManifestError {
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        error: serde_json::Error,
    },
    Signature {
        owner: String,
        error: SignatureError,
    },
    Definition {
        owner: String,
        error: DefinitionError,
    },
    UnknownContract(String),
    ConflictingContract(String),
    InvalidProvider {
        id: String,
        reason: &'static str,
    },
    /// Manifests that contain each other.
    NestedCycle(Vec<PathBuf>),
    Reflection {
        path: PathBuf,
        error: StdError,
    },
    Autowire(AutowireError),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Io { path, error } => write!(f, "Cannot read {}: {error}", path.display()),
            ManifestError::Parse { path: Some(path), error } => {
                write!(f, "Cannot parse {}: {error}", path.display())
            }
            ManifestError::Parse { path: None, error } => write!(f, "Cannot parse manifest: {error}"),
            ManifestError::Signature { owner, error } => write!(f, "{owner}: {error}"),
            ManifestError::Definition { owner, error } => write!(f, "{owner}: {error}"),
            ManifestError::UnknownContract(v) => write!(f, "Unknown contract {v}"),
            ManifestError::ConflictingContract(v) => {
                write!(f, "Contract {v} is declared differently by two graphs")
            }
            ManifestError::InvalidProvider { id, reason } => {
                write!(f, "Invalid service {id}: {reason}")
            }
            ManifestError::NestedCycle(paths) => {
                write!(f, "Manifests contain each other: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            ManifestError::Reflection { path, error } => {
                write!(f, "Cannot load report {}: {error}", path.display())
            }
            ManifestError::Autowire(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManifestError::Io { error, .. } => Some(error),
            ManifestError::Parse { error, .. } => Some(error),
            ManifestError::Signature { error, .. } => Some(error),
            ManifestError::Definition { error, .. } => Some(error),
            ManifestError::Reflection { error, .. } => Some(error.as_ref()),
            ManifestError::Autowire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AutowireError> for ManifestError {
    fn from(value: AutowireError) -> Self {
        Self::Autowire(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> Result<ContractTable, ManifestError> {
        ContractTable::new(serde_json::from_str(text).unwrap())
    }

    #[test]
    fn test_contract_table() {
        let table = table(
            r#"{
                "factory": {"methods": [{"name": "create", "params": ["Url"], "returns": "user::User"}]},
                "user::User": {"name": "User"},
                "Url": {}
            }"#,
        )
        .unwrap();
        let contracts = table.contracts();
        assert_eq!(contracts.len(), 3);
        let factory = table.lookup("factory").unwrap();
        let user = table.lookup("user::User").unwrap();
        assert_eq!(contracts.name(user), "User");
        assert_eq!(table.key(user), "user::User");
        let method = contracts.get(factory).unwrap().single_abstract_method().unwrap();
        assert_eq!(method.returns, Signature::of(user));
        assert_eq!(method.params, vec![Signature::of(table.lookup("Url").unwrap())]);
    }

    #[test]
    fn test_same_display_name_stays_distinct() {
        let table = table(r#"{"a::Logger": {"name": "Logger"}, "b::Logger": {"name": "Logger"}}"#)
            .unwrap();
        assert_ne!(table.lookup("a::Logger"), table.lookup("b::Logger"));
    }

    #[test]
    fn test_unknown_contract_in_method() {
        let result = table(r#"{"factory": {"methods": [{"name": "create", "returns": "Missing"}]}}"#);
        assert!(matches!(
            result,
            Err(ManifestError::Signature { owner, error: SignatureError::UnknownContract(v) })
                if owner == "contract factory, method create" && v == "Missing"
        ));
    }

    #[test]
    fn test_provider_kinds() {
        let table = table(r#"{"Db": {}}"#).unwrap();
        let decl = ProviderDecl {
            id: "db".into(),
            capability: "Db".into(),
            dynamic: true,
            scope: Some("local".into()),
            ..Default::default()
        };
        let definition = table.provider(&decl).unwrap();
        assert!(definition.is_dynamic());
        assert_eq!(definition.scope, Scope::Local);

        let missing = ProviderDecl {
            dynamic: false,
            ..decl.clone()
        };
        assert!(matches!(
            table.provider(&missing),
            Err(ManifestError::InvalidProvider { reason: "a factory is required", .. })
        ));

        let bad_scope = ProviderDecl {
            scope: Some("session".into()),
            ..decl
        };
        assert!(matches!(
            table.provider(&bad_scope),
            Err(ManifestError::Definition { error: DefinitionError::InvalidScope(v), .. }) if v == "session"
        ));
    }

    #[test]
    fn test_merge_contracts() {
        let mut merged = BTreeMap::new();
        let first: BTreeMap<String, ContractDecl> =
            serde_json::from_str(r#"{"Db": {}, "Pool": {}}"#).unwrap();
        let second: BTreeMap<String, ContractDecl> =
            serde_json::from_str(r#"{"Db": {}, "Api": {}}"#).unwrap();
        merge_contracts(&mut merged, &first).unwrap();
        merge_contracts(&mut merged, &second).unwrap();
        assert_eq!(merged.len(), 3);

        let conflicting: BTreeMap<String, ContractDecl> =
            serde_json::from_str(r#"{"Db": {"name": "Database"}}"#).unwrap();
        assert!(matches!(
            merge_contracts(&mut merged, &conflicting),
            Err(ManifestError::ConflictingContract(v)) if v == "Db"
        ));
    }
}
