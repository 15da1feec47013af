//! Parsing of injection point types written in Rust type syntax.
//!
//! The recognized modifiers are `Option<T>`, `Vec<T>`, `Iter<T>`,
//! `Future<T>`, `fn() -> T`, `fn(T)`, tuples, `Fork` and `()`. Every other
//! path names a contract and is looked up by its full path.

use std::fmt;

use autowire::{CapabilityId, Signature};
use quote::ToTokens as _;
use syn::{GenericArgument, PathArguments, ReturnType, Type};

#[derive(Debug)]
pub enum SignatureError {
    Parse { text: String, error: syn::Error },
    UnknownContract(String),
    Unsupported(String),
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Parse { text, error } => write!(f, "Cannot parse type {text:?}: {error}"),
            SignatureError::UnknownContract(v) => write!(f, "Unknown contract {v}"),
            SignatureError::Unsupported(v) => write!(f, "Unsupported type {v}"),
        }
    }
}

impl std::error::Error for SignatureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignatureError::Parse { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Parses `text` into a signature, resolving contract names with `lookup`.
pub fn parse_signature<F>(text: &str, lookup: F) -> Result<Signature, SignatureError>
where
    F: Fn(&str) -> Option<CapabilityId>,
{
    let ty = syn::parse_str::<Type>(text).map_err(|error| SignatureError::Parse {
        text: text.to_owned(),
        error,
    })?;
    convert(&ty, &lookup)
}

fn convert(ty: &Type, lookup: &dyn Fn(&str) -> Option<CapabilityId>) -> Result<Signature, SignatureError> {
    match ty {
        Type::Paren(v) => convert(&v.elem, lookup),
        Type::Group(v) => convert(&v.elem, lookup),
        Type::Tuple(v) if v.elems.is_empty() => Ok(Signature::Unit),
        Type::Tuple(v) => Ok(Signature::Tuple(
            v.elems
                .iter()
                .map(|v| convert(v, lookup))
                .collect::<Result<_, _>>()?,
        )),
        Type::BareFn(v) => {
            if v.variadic.is_some() {
                return Err(unsupported(ty));
            }
            let params = v
                .inputs
                .iter()
                .map(|v| convert(&v.ty, lookup))
                .collect::<Result<_, _>>()?;
            let returns = match &v.output {
                ReturnType::Default => Signature::Unit,
                ReturnType::Type(_, v) => convert(v, lookup)?,
            };
            Ok(Signature::Callable {
                params,
                returns: Box::new(returns),
            })
        }
        Type::Path(v) if v.qself.is_none() => {
            let Some(last) = v.path.segments.last() else {
                return Err(unsupported(ty));
            };
            if v.path.segments.len() == 1 {
                let ident = last.ident.to_string();
                match (ident.as_str(), &last.arguments) {
                    ("Fork", PathArguments::None) => return Ok(Signature::ScopedExecution),
                    ("Option", args) => return Ok(convert_argument(ty, args, lookup)?.optional()),
                    ("Vec", args) => return Ok(convert_argument(ty, args, lookup)?.array()),
                    ("Iter", args) => return Ok(convert_argument(ty, args, lookup)?.lazy()),
                    ("Future", args) => return Ok(convert_argument(ty, args, lookup)?.deferred()),
                    _ => {}
                }
            }
            if v.path.segments.iter().any(|v| !v.arguments.is_none()) {
                return Err(unsupported(ty));
            }
            let name = v
                .path
                .segments
                .iter()
                .map(|v| v.ident.to_string())
                .collect::<Vec<_>>()
                .join("::");
            lookup(&name)
                .map(Signature::of)
                .ok_or(SignatureError::UnknownContract(name))
        }
        _ => Err(unsupported(ty)),
    }
}

fn convert_argument(
    ty: &Type,
    arguments: &PathArguments,
    lookup: &dyn Fn(&str) -> Option<CapabilityId>,
) -> Result<Signature, SignatureError> {
    let PathArguments::AngleBracketed(arguments) = arguments else {
        return Err(unsupported(ty));
    };
    let mut types = arguments.args.iter();
    match (types.next(), types.next()) {
        (Some(GenericArgument::Type(inner)), None) => convert(inner, lookup),
        _ => Err(unsupported(ty)),
    }
}

fn unsupported(ty: &Type) -> SignatureError {
    SignatureError::Unsupported(ty.to_token_stream().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autowire::Contracts;

    fn setup() -> (Contracts, CapabilityId, CapabilityId) {
        let mut contracts = Contracts::new();
        let db = contracts.declare("Db");
        let request = contracts.declare("Request");
        (contracts, db, request)
    }

    fn parse(text: &str, db: CapabilityId, request: CapabilityId) -> Result<Signature, SignatureError> {
        parse_signature(text, |name| match name {
            "Db" | "storage::Db" => Some(db),
            "Request" => Some(request),
            _ => None,
        })
    }

    #[test]
    fn test_parse_modifiers() {
        let (_, db, request) = setup();
        assert_eq!(parse("Db", db, request).unwrap(), Signature::of(db));
        assert_eq!(parse("storage::Db", db, request).unwrap(), Signature::of(db));
        assert_eq!(
            parse("Option<Future<Db>>", db, request).unwrap(),
            Signature::of(db).deferred().optional()
        );
        assert_eq!(
            parse("Vec<Future<Db>>", db, request).unwrap(),
            Signature::of(db).deferred().array()
        );
        assert_eq!(parse("Iter<Db>", db, request).unwrap(), Signature::of(db).lazy());
        assert_eq!(parse("Fork", db, request).unwrap(), Signature::ScopedExecution);
        assert_eq!(parse("()", db, request).unwrap(), Signature::Unit);
    }

    #[test]
    fn test_parse_callables_and_tuples() {
        let (contracts, db, request) = setup();
        let accessor = parse("fn() -> Future<Option<Db>>", db, request).unwrap();
        assert_eq!(
            contracts.render(&accessor).to_string(),
            "fn() -> Future<Option<Db>>"
        );
        assert_eq!(
            parse("fn(Request)", db, request).unwrap(),
            Signature::injector(Signature::of(request))
        );
        assert_eq!(
            parse("(Db, Option<Request>)", db, request).unwrap(),
            Signature::tuple([Signature::of(db), Signature::of(request).optional()])
        );
    }

    #[test]
    fn test_parse_errors() {
        let (_, db, request) = setup();
        assert!(matches!(
            parse("Cache", db, request),
            Err(SignatureError::UnknownContract(v)) if v == "Cache"
        ));
        assert!(matches!(
            parse("Vec<Db, Db>", db, request),
            Err(SignatureError::Unsupported(_))
        ));
        assert!(matches!(parse("&Db", db, request), Err(SignatureError::Unsupported(_))));
        assert!(matches!(parse("Vec<", db, request), Err(SignatureError::Parse { .. })));
    }
}
