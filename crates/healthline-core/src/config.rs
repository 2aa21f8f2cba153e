use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use healthline_parser::{builtin_sources, SourceDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_OUTPUT: &str = "merged_health_data.csv";
pub const DEFAULT_CONSOLIDATE_EVERY: usize = 10;

pub const ENV_DATA_DIR: &str = "HEALTHLINE_DATA_DIR";
pub const ENV_OUTPUT: &str = "HEALTHLINE_OUTPUT";
pub const ENV_SUMMARY: &str = "HEALTHLINE_SUMMARY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub output_path: PathBuf,
    pub summary_path: Option<PathBuf>,
    /// Number of per-file fragments held before they are folded into one.
    pub consolidate_every: usize,
    pub sources: BTreeMap<String, SourceOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceOverride {
    pub enabled: Option<bool>,
    pub patterns: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            summary_path: None,
            consolidate_every: DEFAULT_CONSOLIDATE_EVERY,
            sources: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| PipelineError::Config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `HEALTHLINE_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(output) = lookup(ENV_OUTPUT) {
            self.output_path = PathBuf::from(output);
        }
        if let Some(summary) = lookup(ENV_SUMMARY) {
            self.summary_path = Some(PathBuf::from(summary));
        }
    }

    /// The built-in catalogue with overrides applied and disabled sources
    /// removed.
    pub fn resolve_sources(&self) -> Result<Vec<SourceDefinition>> {
        if self.consolidate_every == 0 {
            return Err(PipelineError::Config(
                "consolidate_every must be at least 1".to_string(),
            ));
        }

        let mut sources = builtin_sources();
        for (name, source_override) in &self.sources {
            let Some(source) = sources.iter_mut().find(|s| &s.name == name) else {
                return Err(PipelineError::Config(format!("unknown source '{name}'")));
            };
            if let Some(patterns) = &source_override.patterns {
                if patterns.is_empty() {
                    return Err(PipelineError::Config(format!(
                        "source '{name}' needs at least one pattern"
                    )));
                }
                source.patterns = patterns.clone();
            }
            if source_override.enabled == Some(false) && source.primary {
                return Err(PipelineError::Config(format!(
                    "primary source '{name}' cannot be disabled"
                )));
            }
        }

        sources.retain(|source| {
            self.sources
                .get(&source.name)
                .and_then(|o| o.enabled)
                .unwrap_or(true)
        });
        Ok(sources)
    }
}
