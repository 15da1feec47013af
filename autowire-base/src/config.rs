use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::StdError;

/// JSON document of named configuration sections.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub(crate) configs: BTreeMap<String, serde_json::Value>,
}

/// Typed view over one section of [`Config`].
pub trait ConfigSection: DeserializeOwned {
    fn key() -> &'static str;
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T>(&self, name: impl AsRef<str>) -> Result<T, StdError>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(
            self.configs
                .get(name.as_ref())
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        )?)
    }

    /// Reads a typed section, falling back to its default when absent.
    pub fn section<T>(&self) -> Result<T, StdError>
    where
        T: ConfigSection + Default,
    {
        Ok(self.get::<Option<T>>(T::key())?.unwrap_or_default())
    }

    pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), StdError>
    where
        T: Serialize,
    {
        self.configs
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder form of [`Config::set`]. Values that fail to serialize are
    /// stored as `null`.
    pub fn with<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: Serialize,
    {
        self.configs
            .insert(name.into(), serde_json::to_value(value).unwrap_or_default());
        self
    }

    pub fn merge_from(&mut self, other: Self) -> Result<(), StdError> {
        for (key, value) in other.configs {
            let entry = self.configs.entry(key);
            merge_json_from(entry.or_insert(serde_json::Value::Null), value)?;
        }
        Ok(())
    }

    pub fn parse<T>(text: T) -> Result<Self, StdError>
    where
        T: AsRef<str>,
    {
        Ok(serde_json::from_str(text.as_ref())?)
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, StdError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(text)
    }

    /// Loads an optional base file and merges every override file over it
    /// in order.
    pub async fn load(base: Option<&Path>, overrides: &[PathBuf]) -> Result<Self, StdError> {
        let mut config = match base {
            Some(path) => Self::parse_file(path).await?,
            None => Self::new(),
        };
        for path in overrides {
            config.merge_from(Self::parse_file(path).await?)?;
        }
        Ok(config)
    }

    /// Check if the config is empty
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Get the number of config entries
    pub fn len(&self) -> usize {
        self.configs.len()
    }
}

fn merge_json_from(lhs: &mut serde_json::Value, rhs: serde_json::Value) -> Result<(), StdError> {
    match lhs {
        serde_json::Value::Object(l) => match rhs {
            serde_json::Value::Object(r) => {
                for (key, value) in r {
                    let entry = l.entry(key);
                    merge_json_from(entry.or_insert(serde_json::Value::Null), value)?;
                }
            }
            _ => *lhs = rhs,
        },
        serde_json::Value::Array(l) => match rhs {
            serde_json::Value::Array(r) => {
                l.extend(r);
            }
            _ => *lhs = rhs,
        },
        _ => *lhs = rhs,
    }
    Ok(())
}

/// Settings of a manifest analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Overrides the graph name declared by the root manifest.
    #[serde(default)]
    pub graph_name: Option<String>,
    /// Pretty-print reports.
    #[serde(default)]
    pub pretty: bool,
    /// Directory searched for compiled reports referenced by relative path.
    #[serde(default)]
    pub reflections: Option<PathBuf>,
}

impl ConfigSection for AnalysisConfig {
    fn key() -> &'static str {
        "analysis"
    }
}
