//! # autowire-base
//!
//! Everything around the [`autowire`] engine that a real analysis needs:
//! configuration, tracing, manifests describing graphs, reports of resolved
//! graphs, diagnostics and the `autowire` command-line interface.
//!
//! ## Core Components
//!
//! - **Configuration**: JSON sections loaded from a base file and merged with overrides
//! - **Manifests**: Contracts, providers and decorators with Rust-syntax types
//! - **Analysis**: Loads nested manifests and compiled reports, then assembles the graph
//! - **Reports**: Serializable resolved graphs, reusable as nested graph reflections
//! - **Commands**: `resolve`, `check` and `config` subcommands
//!
//! ## Example
//!
//! ```rust
//! use autowire_base::{AnalysisConfig, Analyzer, Manifest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let manifest = Manifest::parse(
//!     r#"{
//!         "name": "app",
//!         "contracts": {"Pool": {}, "Api": {}},
//!         "providers": [
//!             {"id": "pool", "capability": "Pool", "factory": {"name": "Pool::connect", "async": true}},
//!             {"id": "api", "capability": "Api", "factory": {
//!                 "name": "Api::new",
//!                 "params": [{"name": "pool", "type": "Pool"}]
//!             }}
//!         ]
//!     }"#,
//! )?;
//! let analysis = Analyzer::new(AnalysisConfig::default())
//!     .analyze(manifest, ".")
//!     .await?;
//! assert!(analysis.graph().find("api").unwrap().is_async);
//! println!("{}", analysis.report().to_json(true)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): Enables the `#[config_section]` attribute

mod analysis;
mod command;
mod config;
mod diagnostic;
mod manifest;
mod reflection;
mod report;
mod signature;
mod tracing;

pub use analysis::*;
pub use command::*;
pub use config::*;
pub use diagnostic::*;
pub use manifest::*;
pub use reflection::*;
pub use report::*;
pub use signature::*;
pub use tracing::*;

#[cfg(feature = "macros")]
pub use autowire_base_macros::*;

pub use async_trait::async_trait;

pub type StdError = Box<dyn std::error::Error + Send + Sync>;
