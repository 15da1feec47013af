//! # autowire
//!
//! A static dependency-injection resolver. Given declared service providers
//! and the capabilities (contracts) they satisfy, it wires every injection
//! point to its candidates, enforces scope rules, detects cycles, and decides
//! for every provider whether constructing it requires asynchronous work.
//! The result is a fully resolved graph an emitter can turn into explicit
//! initialization code without further analysis.
//!
//! ## Core Concepts
//!
//! - **Contracts**: Declared capabilities, compared by identity
//! - **Providers**: Factory-backed, dynamic (supplied at run time),
//!   auto-implemented, or containers of a nested graph
//! - **Decorators**: Cross-cutting modifiers keyed by a target capability
//! - **Injection points**: Factory and hook parameters, each consumed in one
//!   [`InjectionMode`]
//! - **Assembler**: Runs a full pass and produces a [`ResolvedGraph`]
//!
//! ## Basic Usage
//!
//! ```rust
//! use autowire::{
//!     Bridging, Callable, Contracts, GraphAssembler, InjectionMode, ProviderDefinition, Scope,
//!     Signature,
//! };
//!
//! let mut contracts = Contracts::new();
//! let pool = contracts.declare("Pool");
//! let request = contracts.declare("Request");
//! let handler = contracts.declare("Handler");
//!
//! let mut assembler = GraphAssembler::new("app", &contracts);
//! assembler
//!     .add_provider(ProviderDefinition::factory(
//!         "pool",
//!         pool,
//!         Callable::new("Pool::connect").asynchronous(),
//!     ))
//!     .unwrap();
//! assembler
//!     .add_provider(
//!         ProviderDefinition::factory("request", request, Callable::new("Request::new"))
//!             .scope(Scope::Local),
//!     )
//!     .unwrap();
//! assembler
//!     .add_provider(ProviderDefinition::factory(
//!         "handler",
//!         handler,
//!         Callable::new("Handler::new")
//!             .param("pool", Signature::of(pool))
//!             .param("request", Signature::accessor(Signature::of(request))),
//!     ))
//!     .unwrap();
//!
//! let graph = assembler.assemble().unwrap();
//! let handler = graph.find("handler").unwrap();
//! assert!(handler.is_async);
//!
//! let pool = &handler.plan.factory[0];
//! assert_eq!(pool.targets()[0].bridging, Bridging::AwaitThenUse);
//! let request = &handler.plan.factory[1];
//! assert_eq!(request.mode, InjectionMode::Accessor);
//! ```
//!
//! ## Nested Graphs
//!
//! A [`ResolvedGraph`] implements [`ContainerReflection`], so it can be
//! wrapped by a container provider of another graph analyzed against the same
//! [`Contracts`]. Its public services become foreign definitions of the
//! enclosing graph, and its dynamic services are filled from unique
//! candidates of the enclosing graph.

mod assembler;
mod asynchrony;
mod capability;
mod chain;
mod definition;
mod error;
mod foreign;
mod graph;
mod index;
mod inject;
mod resolve;

pub use assembler::*;
pub use capability::*;
pub use definition::*;
pub use error::*;
pub use foreign::{ContainerReflection, ReflectedGraph, ReflectedService, SubRegistration};
pub use graph::{
    AppliedDecorator, AutoImplementation, DefinitionGraph, HoistOrigin, HoistedArgument, HookPlan,
    ProviderPlan,
};
pub use index::*;
pub use inject::{Bridging, InjectedValue, Injection, InjectionMode, Target};
