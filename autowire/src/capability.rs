//! Capabilities and the narrow view of the host type system the engine needs.
//!
//! A capability is a declared contract. Contracts are compared by identity:
//! two contracts declared separately are different capabilities even when
//! they share a name and a shape. The only structural operations the engine
//! performs are unwrapping the fixed set of modifiers in [`Signature`] and
//! enumerating the methods of an abstract contract.

use std::fmt;

/// Identity of a declared contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityId(u32);

impl CapabilityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared contract.
#[derive(Clone, Debug)]
pub struct Contract {
    name: String,
    methods: Vec<Method>,
    is_abstract: bool,
}

impl Contract {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns the only unimplemented method, if there is exactly one.
    pub fn single_abstract_method(&self) -> Option<&Method> {
        let mut unimplemented = self.methods.iter().filter(|v| !v.implemented);
        match (unimplemented.next(), unimplemented.next()) {
            (Some(method), None) => Some(method),
            _ => None,
        }
    }
}

/// Method of an abstract contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Signature>,
    pub returns: Signature,
    pub implemented: bool,
}

impl Method {
    pub fn new(name: impl Into<String>, returns: Signature) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns,
            implemented: false,
        }
    }

    pub fn param(mut self, signature: Signature) -> Self {
        self.params.push(signature);
        self
    }

    pub fn implemented(mut self) -> Self {
        self.implemented = true;
        self
    }
}

/// Table of every contract known to an analysis.
///
/// Graphs that are merged into each other must be analyzed against the same
/// table, otherwise their capabilities never match.
#[derive(Clone, Debug, Default)]
pub struct Contracts {
    contracts: Vec<Contract>,
}

impl Contracts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new concrete contract and returns its identity.
    pub fn declare(&mut self, name: impl Into<String>) -> CapabilityId {
        self.push(Contract {
            name: name.into(),
            methods: Vec::new(),
            is_abstract: false,
        })
    }

    /// Declares a new abstract contract with the given methods.
    pub fn declare_abstract(
        &mut self,
        name: impl Into<String>,
        methods: Vec<Method>,
    ) -> CapabilityId {
        self.push(Contract {
            name: name.into(),
            methods,
            is_abstract: true,
        })
    }

    /// Replaces the methods of an abstract contract.
    ///
    /// Lets contracts whose methods mention each other be declared first and
    /// described afterwards. Returns `false` for unknown or concrete contracts.
    pub fn define_methods(&mut self, id: CapabilityId, methods: Vec<Method>) -> bool {
        match self.contracts.get_mut(id.index()) {
            Some(contract) if contract.is_abstract => {
                contract.methods = methods;
                true
            }
            _ => false,
        }
    }

    fn push(&mut self, contract: Contract) -> CapabilityId {
        let id = CapabilityId(self.contracts.len() as u32);
        self.contracts.push(contract);
        id
    }

    pub fn get(&self, id: CapabilityId) -> Option<&Contract> {
        self.contracts.get(id.index())
    }

    pub fn name(&self, id: CapabilityId) -> &str {
        self.get(id).map_or("<unknown>", |v| v.name())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CapabilityId, &Contract)> {
        self.contracts
            .iter()
            .enumerate()
            .map(|(i, v)| (CapabilityId(i as u32), v))
    }

    /// Renders a signature with contract names, for diagnostics.
    pub fn render<'a>(&'a self, signature: &'a Signature) -> impl fmt::Display + 'a {
        Rendered {
            contracts: self,
            signature,
        }
    }
}

/// Declared type of an injection point, before modifier unwrapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Signature {
    Capability(CapabilityId),
    /// `Option<T>`
    Optional(Box<Signature>),
    /// `Vec<T>`
    Array(Box<Signature>),
    /// `Iter<T>`
    LazySequence(Box<Signature>),
    /// `Future<T>`
    Deferred(Box<Signature>),
    /// `fn(A, ..) -> R`
    Callable {
        params: Vec<Signature>,
        returns: Box<Signature>,
    },
    Tuple(Vec<Signature>),
    /// `Fork`
    ScopedExecution,
    Unit,
}

impl Signature {
    pub fn of(capability: CapabilityId) -> Self {
        Self::Capability(capability)
    }

    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    pub fn array(self) -> Self {
        Self::Array(Box::new(self))
    }

    pub fn lazy(self) -> Self {
        Self::LazySequence(Box::new(self))
    }

    pub fn deferred(self) -> Self {
        Self::Deferred(Box::new(self))
    }

    pub fn accessor(returns: Signature) -> Self {
        Self::Callable {
            params: Vec::new(),
            returns: Box::new(returns),
        }
    }

    pub fn injector(param: Signature) -> Self {
        Self::Callable {
            params: vec![param],
            returns: Box::new(Self::Unit),
        }
    }

    pub fn tuple(items: impl IntoIterator<Item = Signature>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    /// Whether the declared type itself tolerates a missing value.
    pub fn admits_absence(&self) -> bool {
        matches!(self, Self::Optional(_))
    }
}

struct Rendered<'a> {
    contracts: &'a Contracts,
    signature: &'a Signature,
}

impl Rendered<'_> {
    fn nested<'b>(&'b self, signature: &'b Signature) -> Rendered<'b> {
        Rendered {
            contracts: self.contracts,
            signature,
        }
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signature {
            Signature::Capability(id) => write!(f, "{}", self.contracts.name(*id)),
            Signature::Optional(v) => write!(f, "Option<{}>", self.nested(v)),
            Signature::Array(v) => write!(f, "Vec<{}>", self.nested(v)),
            Signature::LazySequence(v) => write!(f, "Iter<{}>", self.nested(v)),
            Signature::Deferred(v) => write!(f, "Future<{}>", self.nested(v)),
            Signature::Callable { params, returns } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.nested(param))?;
                }
                write!(f, ")")?;
                if **returns != Signature::Unit {
                    write!(f, " -> {}", self.nested(returns))?;
                }
                Ok(())
            }
            Signature::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.nested(item))?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Signature::ScopedExecution => write!(f, "Fork"),
            Signature::Unit => write!(f, "()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_not_name() {
        let mut contracts = Contracts::new();
        let a = contracts.declare("Logger");
        let b = contracts.declare("Logger");
        assert_ne!(a, b);
        assert_eq!(contracts.name(a), contracts.name(b));
    }

    #[test]
    fn test_single_abstract_method() {
        let mut contracts = Contracts::new();
        let user = contracts.declare("User");
        let factory = contracts.declare_abstract(
            "UserFactory",
            vec![
                Method::new("create", Signature::of(user)),
                Method::new("describe", Signature::Unit).implemented(),
            ],
        );
        let method = contracts.get(factory).unwrap().single_abstract_method();
        assert_eq!(method.map(|v| v.name.as_str()), Some("create"));

        let broken = contracts.declare_abstract(
            "Broken",
            vec![
                Method::new("a", Signature::of(user)),
                Method::new("b", Signature::of(user)),
            ],
        );
        assert!(contracts.get(broken).unwrap().single_abstract_method().is_none());
    }

    #[test]
    fn test_define_methods() {
        let mut contracts = Contracts::new();
        let user = contracts.declare("User");
        let factory = contracts.declare_abstract("UserFactory", Vec::new());
        assert!(contracts.get(factory).unwrap().single_abstract_method().is_none());
        assert!(contracts.define_methods(factory, vec![Method::new("create", Signature::of(user))]));
        assert!(contracts.get(factory).unwrap().single_abstract_method().is_some());
        assert!(!contracts.define_methods(user, Vec::new()));
    }

    #[test]
    fn test_render() {
        let mut contracts = Contracts::new();
        let db = contracts.declare("Db");
        let signature = Signature::accessor(Signature::of(db).deferred()).optional();
        assert_eq!(
            contracts.render(&signature).to_string(),
            "Option<fn() -> Future<Db>>"
        );
        let signature = Signature::tuple([Signature::of(db), Signature::ScopedExecution]);
        assert_eq!(contracts.render(&signature).to_string(), "(Db, Fork)");
    }
}
