//! Loading manifests with their nested graphs and assembling them.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use autowire::{GraphAssembler, ResolvedGraph};

use crate::{
    AnalysisConfig, CompiledGraph, ContainerRef, ContractDecl, ContractTable, FileReflectionLoader,
    GraphReport, Manifest, ManifestError, ReflectionLoader, merge_contracts,
};

/// Runs analyses of manifests.
pub struct Analyzer {
    config: AnalysisConfig,
    loader: Box<dyn ReflectionLoader>,
}

/// Resolved root graph together with the contracts it was analyzed against.
#[derive(Debug)]
pub struct Analysis {
    table: ContractTable,
    graph: ResolvedGraph,
}

impl Analysis {
    pub fn table(&self) -> &ContractTable {
        &self.table
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    pub fn report(&self) -> GraphReport {
        GraphReport::new(&self.graph, &self.table)
    }
}

struct LoadedManifest {
    manifest: Manifest,
    /// Nested graphs by container id.
    nested: BTreeMap<String, Nested>,
}

enum Nested {
    Manifest(Box<LoadedManifest>),
    Report(GraphReport),
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<LoadedManifest, ManifestError>> + Send + 'a>>;

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            loader: Box::new(FileReflectionLoader),
        }
    }

    pub fn with_loader<L>(mut self, loader: L) -> Self
    where
        L: ReflectionLoader + 'static,
    {
        self.loader = Box::new(loader);
        self
    }

    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<Analysis, ManifestError> {
        let path = canonicalize(path.as_ref()).await?;
        let manifest = Manifest::parse_file(&path).await?;
        let dir = parent_dir(&path);
        let root = self.load(manifest, dir, vec![path]).await?;
        self.finish(root)
    }

    /// Analyzes a manifest that is not stored in a file. Nested graphs are
    /// looked up relative to `dir`.
    pub async fn analyze(&self, manifest: Manifest, dir: impl AsRef<Path>) -> Result<Analysis, ManifestError> {
        let root = self.load(manifest, dir.as_ref().to_owned(), Vec::new()).await?;
        self.finish(root)
    }

    fn finish(&self, root: LoadedManifest) -> Result<Analysis, ManifestError> {
        let mut declarations = BTreeMap::new();
        collect_contracts(&root, &mut declarations)?;
        let table = ContractTable::new(declarations)?;
        let name = self
            .config
            .graph_name
            .clone()
            .unwrap_or_else(|| root.manifest.name.clone());
        let graph = assemble(&table, &root, name)?;
        Ok(Analysis { table, graph })
    }

    fn load(&self, manifest: Manifest, dir: PathBuf, stack: Vec<PathBuf>) -> LoadFuture<'_> {
        Box::pin(async move {
            let mut nested = BTreeMap::new();
            for provider in &manifest.providers {
                match &provider.container {
                    None => {}
                    Some(ContainerRef::Manifest(path)) => {
                        let path = canonicalize(&dir.join(path)).await?;
                        if stack.contains(&path) {
                            let mut cycle = stack.clone();
                            cycle.push(path);
                            return Err(ManifestError::NestedCycle(cycle));
                        }
                        tracing::debug!(
                            graph = %manifest.name,
                            container = %provider.id,
                            path = %path.display(),
                            "Load nested manifest"
                        );
                        let child = Manifest::parse_file(&path).await?;
                        let child_dir = parent_dir(&path);
                        let mut child_stack = stack.clone();
                        child_stack.push(path);
                        let loaded = self.load(child, child_dir, child_stack).await?;
                        nested.insert(provider.id.clone(), Nested::Manifest(Box::new(loaded)));
                    }
                    Some(ContainerRef::Report(path)) => {
                        let path = match &self.config.reflections {
                            Some(reflections) if path.is_relative() => reflections.join(path),
                            _ => dir.join(path),
                        };
                        tracing::debug!(
                            graph = %manifest.name,
                            container = %provider.id,
                            path = %path.display(),
                            "Load report"
                        );
                        let report = self
                            .loader
                            .load(&path)
                            .await
                            .map_err(|error| ManifestError::Reflection { path, error })?;
                        nested.insert(provider.id.clone(), Nested::Report(report));
                    }
                }
            }
            Ok(LoadedManifest { manifest, nested })
        })
    }
}

fn collect_contracts(
    loaded: &LoadedManifest,
    into: &mut BTreeMap<String, ContractDecl>,
) -> Result<(), ManifestError> {
    merge_contracts(into, &loaded.manifest.contracts)?;
    for nested in loaded.nested.values() {
        match nested {
            Nested::Manifest(v) => collect_contracts(v, into)?,
            Nested::Report(v) => merge_contracts(into, &v.contracts)?,
        }
    }
    Ok(())
}

fn assemble(
    table: &ContractTable,
    loaded: &LoadedManifest,
    name: String,
) -> Result<ResolvedGraph, ManifestError> {
    let mut assembler = GraphAssembler::new(name, table.contracts());
    for decl in &loaded.manifest.providers {
        let definition = match (&decl.container, loaded.nested.get(&decl.id)) {
            (None, _) => table.provider(decl)?,
            (Some(_), Some(Nested::Manifest(child))) => {
                let graph = assemble(table, child, child.manifest.name.clone())?;
                table.container(decl, &graph)?
            }
            (Some(_), Some(Nested::Report(report))) => {
                let graph = CompiledGraph::new(report, table)?;
                table.container(decl, &graph)?
            }
            (Some(_), None) => {
                return Err(ManifestError::InvalidProvider {
                    id: decl.id.clone(),
                    reason: "nested graph was not loaded",
                });
            }
        };
        assembler.add_provider(definition)?;
    }
    for decl in &loaded.manifest.decorators {
        assembler.add_decorator(table.decorator(decl)?);
    }
    Ok(assembler.assemble()?)
}

async fn canonicalize(path: &Path) -> Result<PathBuf, ManifestError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|error| ManifestError::Io {
            path: path.to_owned(),
            error,
        })
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_owned).unwrap_or_default()
}
