use crate::engine::DEFAULT_LOAD_CHUNK_SIZE;
use crate::index::VectorConfig;
use crate::Result;
use docindex_protocol::IndexKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "docindex.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_kinds")]
    pub kinds: Vec<IndexKind>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    #[serde(default = "default_load_chunk_size")]
    pub load_chunk_size: usize,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_kinds() -> Vec<IndexKind> {
    vec![IndexKind::SchemaMatch, IndexKind::FullText, IndexKind::Graph]
}

fn default_batch_size() -> usize {
    64
}

fn default_time_budget_ms() -> u64 {
    100
}

fn default_load_chunk_size() -> usize {
    DEFAULT_LOAD_CHUNK_SIZE
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
            batch_size: default_batch_size(),
            time_budget_ms: default_time_budget_ms(),
            load_chunk_size: default_load_chunk_size(),
            vector: VectorConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read `path` if it exists.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("Loaded engine config from {}", path.display());
        Ok(Some(config))
    }

    #[must_use]
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    #[must_use]
    pub fn wants(&self, kind: &IndexKind) -> bool {
        self.kinds.contains(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_vector_store::ChunkCombination;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn parses_kinds_and_overrides() {
        let raw = r#"
            batch_size = 8
            time_budget_ms = 5

            [[kinds]]
            kind = "full-text"

            [[kinds]]
            kind = "field-match"
            field = "status"

            [vector]
            dimension = 64
            combination = "max"

            [scheduler]
            debounce_ms = 10
        "#;
        let config = EngineConfig::from_toml_str(raw).unwrap();
        assert_eq!(
            config.kinds,
            vec![IndexKind::FullText, IndexKind::field_match("status")]
        );
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.time_budget(), Duration::from_millis(5));
        assert_eq!(config.load_chunk_size, DEFAULT_LOAD_CHUNK_SIZE);
        assert_eq!(config.vector.dimension, 64);
        assert_eq!(config.vector.combination, ChunkCombination::Max);
        assert_eq!(config.scheduler.debounce(), Duration::from_millis(10));
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let raw = "[[kinds]]\nkind = \"hologram\"\n";
        assert!(matches!(
            EngineConfig::from_toml_str(raw),
            Err(crate::IndexerError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(&dir.path().join(CONFIG_FILE_NAME))
            .await
            .unwrap()
            .is_none());
    }
}
