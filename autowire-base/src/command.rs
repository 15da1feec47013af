//! Command-line interface of autowire.
//!
//! Commands are subcommands of one CLI sharing the global `--config` and
//! `--config-override` arguments. Each command receives a [`Context`] holding
//! the merged configuration.
//!
//! # Examples
//!
//! ```rust
//! use autowire_base::{Command, Context};
//! use clap::{ArgMatches, Command as ClapCommand};
//! use std::process::ExitCode;
//! use std::sync::Arc;
//!
//! struct HelloCommand;
//!
//! impl Command for HelloCommand {
//!     fn command() -> ClapCommand {
//!         ClapCommand::new("hello").about("Prints a greeting")
//!     }
//!
//!     async fn main(_context: Arc<Context>, _matches: ArgMatches) -> ExitCode {
//!         println!("Hello, World!");
//!         ExitCode::SUCCESS
//!     }
//! }
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};

use crate::{AnalysisConfig, Analyzer, Config, Diagnostic, StdError, Tracing};

/// State shared by every command of one run.
pub struct Context {
    config: Config,
    tracing: Option<Tracing>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tracing: None,
        }
    }

    /// Loads the configuration and installs tracing as requested by `matches`.
    pub async fn from_matches(matches: &ArgMatches) -> Result<Self, StdError> {
        let base = matches.get_one::<String>("config").map(PathBuf::from);
        let overrides: Vec<PathBuf> = matches
            .get_many::<String>("config-override")
            .unwrap_or_default()
            .map(PathBuf::from)
            .collect();
        let config = Config::load(base.as_deref(), &overrides).await?;
        let tracing = Tracing::install(&config)?;
        Ok(Self { config, tracing })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracing(&self) -> Option<&Tracing> {
        self.tracing.as_ref()
    }

    /// Analyzer configured by the `analysis` section.
    pub fn analyzer(&self) -> Result<Analyzer, StdError> {
        Ok(Analyzer::new(self.config.section::<AnalysisConfig>()?))
    }
}

/// A subcommand of the CLI.
pub trait Command: Send + Sync {
    fn command() -> clap::Command
    where
        Self: Sized;

    fn main(
        context: Arc<Context>,
        matches: ArgMatches,
    ) -> impl std::future::Future<Output = ExitCode> + Send {
        let _ = (context, matches);
        async move { ExitCode::FAILURE }
    }
}

#[async_trait]
trait DynCommand: Send + Sync {
    fn command(&self) -> clap::Command;

    async fn main(&self, context: Arc<Context>, matches: ArgMatches) -> ExitCode;
}

#[async_trait]
impl<T> DynCommand for T
where
    T: Command,
{
    fn command(&self) -> clap::Command {
        T::command()
    }

    async fn main(&self, context: Arc<Context>, matches: ArgMatches) -> ExitCode {
        T::main(context, matches).await
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<TypeId, Box<dyn DynCommand>>,
}

impl CommandRegistry {
    /// Registry with the `resolve`, `check` and `config` commands.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.add_command::<ResolveCommand>();
        registry.add_command::<CheckCommand>();
        registry.add_command::<ConfigCommand>();
        registry
    }

    pub fn add_command<T>(&mut self)
    where
        T: Command + 'static,
    {
        let type_id = TypeId::of::<T>();
        self.commands
            .insert(type_id, Box::new(CommandWrapper::<T>(PhantomData)));
    }

    pub fn has_command<T>(&self) -> bool
    where
        T: Command + 'static,
    {
        let type_id = TypeId::of::<T>();
        self.commands.contains_key(&type_id)
    }

    pub fn build_cli(&self) -> clap::Command {
        let mut commands: Vec<_> = self.commands.values().map(|v| v.command()).collect();
        commands.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        clap::Command::new("autowire")
            .about("Static dependency injection graph resolution")
            .subcommand_required(true)
            .arg(
                Arg::new("config")
                    .long("config")
                    .short('c')
                    .global(true),
            )
            .arg(
                Arg::new("config-override")
                    .long("config-override")
                    .short('o')
                    .action(ArgAction::Append)
                    .global(true),
            )
            .subcommands(commands)
    }

    /// Runs the subcommand selected in `matches`.
    pub async fn dispatch(&self, context: Arc<Context>, mut matches: ArgMatches) -> ExitCode {
        let Some((name, matches)) = matches.remove_subcommand() else {
            return ExitCode::FAILURE;
        };
        match self
            .commands
            .values()
            .find(|v| v.command().get_name() == name)
        {
            Some(command) => command.main(context, matches).await,
            None => {
                eprintln!("Unknown command: {name}");
                ExitCode::FAILURE
            }
        }
    }

    /// Parses the process arguments and runs the selected command.
    pub async fn run_main(self) -> ExitCode {
        self.run_from(std::env::args_os()).await
    }

    pub async fn run_from<I, T>(self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.build_cli().try_get_matches_from(args) {
            Ok(v) => v,
            Err(err) => {
                let _ = err.print();
                return if err.use_stderr() {
                    ExitCode::from(2)
                } else {
                    ExitCode::SUCCESS
                };
            }
        };
        let context = match Context::from_matches(&matches).await {
            Ok(v) => Arc::new(v),
            Err(err) => {
                eprintln!("Cannot load configuration: {err}");
                return ExitCode::FAILURE;
            }
        };
        self.dispatch(context, matches).await
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

struct CommandWrapper<T>(PhantomData<T>)
where
    T: Command;

impl<T> Command for CommandWrapper<T>
where
    T: Command,
{
    fn command() -> clap::Command
    where
        Self: Sized,
    {
        T::command()
    }

    async fn main(context: Arc<Context>, matches: ArgMatches) -> ExitCode {
        T::main(context, matches).await
    }
}

fn manifest_arg() -> Arg {
    Arg::new("manifest")
        .required(true)
        .help("Path to the root manifest")
}

/// Assembles a manifest and prints or writes its report.
pub struct ResolveCommand;

impl Command for ResolveCommand {
    fn command() -> clap::Command
    where
        Self: Sized,
    {
        clap::Command::new("resolve")
            .about("Resolves a manifest and emits its report")
            .arg(manifest_arg())
            .arg(
                Arg::new("output")
                    .long("output")
                    .help("Write the report to a file instead of stdout"),
            )
    }

    async fn main(context: Arc<Context>, matches: ArgMatches) -> ExitCode {
        let Some(manifest) = matches.get_one::<String>("manifest") else {
            return ExitCode::FAILURE;
        };
        let config = match context.config().section::<AnalysisConfig>() {
            Ok(v) => v,
            Err(err) => {
                eprintln!("Invalid analysis config: {err}");
                return ExitCode::FAILURE;
            }
        };
        let pretty = config.pretty;
        let analysis = match Analyzer::new(config).analyze_file(manifest).await {
            Ok(v) => v,
            Err(err) => {
                eprintln!("{}", Diagnostic::from_manifest(&err));
                return ExitCode::FAILURE;
            }
        };
        let report = analysis.report();
        let result = match matches.get_one::<String>("output") {
            Some(output) => report.write_file(output, pretty).await,
            None => report.to_json(pretty).map(|v| println!("{v}")),
        };
        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Cannot write report: {err}");
                ExitCode::FAILURE
            }
        }
    }
}

/// Assembles a manifest and reports whether it is valid.
pub struct CheckCommand;

impl Command for CheckCommand {
    fn command() -> clap::Command
    where
        Self: Sized,
    {
        clap::Command::new("check")
            .about("Checks that a manifest resolves")
            .arg(manifest_arg())
    }

    async fn main(context: Arc<Context>, matches: ArgMatches) -> ExitCode {
        let Some(manifest) = matches.get_one::<String>("manifest") else {
            return ExitCode::FAILURE;
        };
        let analyzer = match context.analyzer() {
            Ok(v) => v,
            Err(err) => {
                eprintln!("Invalid analysis config: {err}");
                return ExitCode::FAILURE;
            }
        };
        match analyzer.analyze_file(manifest).await {
            Ok(analysis) => {
                println!("{}", Diagnostic::resolved(analysis.graph()));
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::debug!("Analysis failed: {err:?}");
                eprintln!("{}", Diagnostic::from_manifest(&err));
                ExitCode::FAILURE
            }
        }
    }
}

/// Prints the merged configuration.
pub struct ConfigCommand;

impl Command for ConfigCommand {
    fn command() -> clap::Command
    where
        Self: Sized,
    {
        clap::Command::new("config").about("Prints the merged configuration")
    }

    async fn main(context: Arc<Context>, _matches: ArgMatches) -> ExitCode {
        match serde_json::to_string_pretty(&context.config().configs) {
            Ok(v) => {
                println!("{v}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("Cannot print configuration: {err}");
                ExitCode::FAILURE
            }
        }
    }
}
