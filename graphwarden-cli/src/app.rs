//! Shared wiring for command handlers.
//!
//! Builds the normalizer, graph store and rule store from the loaded
//! configuration. Every command that touches the graph goes through [`App`].

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use graphwarden_core::config::GraphwardenConfig;
use graphwarden_core::error::ConfigError;
use graphwarden_detection::{DetectionEngine, DetectionError, RuleLoader, RuleStore};
use graphwarden_graph::{MemoryGraphStore, PersistenceAdapter};
use graphwarden_normalize::Normalizer;

use crate::error::CliError;

/// URI scheme of the in-process graph store.
const MEMORY_GRAPH_SCHEME: &str = "memory://";

/// Loads the configuration. A missing file falls back to defaults plus env overrides.
pub async fn load_config(path: &Path) -> Result<GraphwardenConfig, CliError> {
    Ok(GraphwardenConfig::load_or_default(path).await?)
}

/// Queue backend selected by `queue.backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Kafka,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "kafka" => Ok(Self::Kafka),
            other => Err(ConfigError::InvalidValue {
                field: "queue.backend".to_owned(),
                reason: format!("unknown backend '{other}' (expected memory or kafka)"),
            }),
        }
    }
}

/// Process-wide components shared by the commands.
pub struct App {
    pub config: GraphwardenConfig,
    pub normalizer: Arc<Normalizer>,
    pub store: Arc<MemoryGraphStore>,
    pub rules: Arc<RuleStore>,
}

impl App {
    pub async fn build(config: GraphwardenConfig) -> Result<Self, CliError> {
        if !config.graph.uri.starts_with(MEMORY_GRAPH_SCHEME) {
            return Err(CliError::Config(format!(
                "unsupported graph uri '{}': this build only ships the {MEMORY_GRAPH_SCHEME} store",
                config.graph.uri
            )));
        }

        let normalizer = Arc::new(Normalizer::from_config(&config.schema).await?);
        let store = Arc::new(MemoryGraphStore::from_config(&config.graph));
        let rules = Arc::new(RuleStore::from_config(&config.detection));
        info!(
            schema_version = normalizer.schema_version(),
            max_connections = config.graph.max_connections,
            "graphwarden components initialized"
        );

        Ok(Self {
            config,
            normalizer,
            store,
            rules,
        })
    }

    pub fn backend(&self) -> Result<Backend, CliError> {
        self.config
            .queue
            .backend
            .parse::<Backend>()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    pub fn adapter(&self) -> PersistenceAdapter<MemoryGraphStore> {
        PersistenceAdapter::new(Arc::clone(&self.store))
    }

    pub fn engine(&self) -> DetectionEngine<MemoryGraphStore> {
        DetectionEngine::from_config(
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
            &self.config.detection,
        )
    }

    /// Loads `detection.rules_path` into the rule store. Returns the number of loaded rules.
    pub async fn load_rules(&self) -> Result<usize, CliError> {
        let path = &self.config.detection.rules_path;
        let loaded = RuleLoader::load_path(path)
            .await
            .map_err(|e| CliError::Rule(e.to_string()))?;
        for rejected in &loaded.rejected {
            warn!(path = %path, error = %rejected, "rule skipped");
        }
        let count = self
            .rules
            .load(loaded.rules)
            .await
            .map_err(DetectionError::from)?;
        Ok(count)
    }
}

/// Reads non-empty input lines from a file, or stdin for `-`.
pub async fn read_lines(input: &Path) -> Result<Vec<String>, CliError> {
    use tokio::io::AsyncBufReadExt;

    let mut lines = Vec::new();
    if input.as_os_str() == "-" {
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = reader.next_line().await? {
            lines.push(line);
        }
    } else {
        let content = tokio::fs::read_to_string(input).await?;
        lines.extend(content.lines().map(str::to_owned));
    }
    lines.retain(|line| !line.trim().is_empty());
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<Backend>().unwrap(), Backend::Memory);
        assert_eq!("kafka".parse::<Backend>().unwrap(), Backend::Kafka);
        assert!("rabbitmq".parse::<Backend>().is_err());
    }

    #[tokio::test]
    async fn non_memory_graph_uri_is_config_error() {
        let mut config = GraphwardenConfig::default();
        config.graph.uri = "bolt://localhost:7687".to_owned();
        let err = App::build(config).await.err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn read_lines_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        std::fs::write(&path, "first\n\n   \nsecond\n").unwrap();
        assert_eq!(read_lines(&path).await.unwrap(), vec!["first", "second"]);
    }
}
