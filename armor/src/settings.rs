use crate::storage::backend::StorageBackend;
use crate::storage::compression::Compression;
use crate::storage::file::FileBackend;
use crate::storage::memory::MemoryObjectStore;
use crate::ArmorError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Off,
    Low,
    Mild,
    High,
}

impl FromStr for Parallelism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Parallelism::Off),
            "low" => Ok(Parallelism::Low),
            "mild" => Ok(Parallelism::Mild),
            "high" => Ok(Parallelism::High),
            _ => Err(format!("Invalid value for Parallelism: {}", s)),
        }
    }
}

impl From<Parallelism> for usize {
    fn from(parallelism: Parallelism) -> Self {
        let threads = match parallelism {
            Parallelism::Off => 1,
            Parallelism::Low => num_cpus::get() / 8,
            Parallelism::Mild => num_cpus::get() / 4,
            Parallelism::High => num_cpus::get() / 2,
        };
        threads.max(1)
    }
}

impl<'de> serde::Deserialize<'de> for Parallelism {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Parallelism::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Memory,
}

fn default_compression() -> Compression {
    Compression::Zstd
}

fn default_parallelism() -> Parallelism {
    Parallelism::Mild
}

fn default_shard_count() -> usize {
    1
}

fn default_compaction_trigger() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: BackendKind,
    #[serde(default)]
    pub base_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WriterSettings {
    pub name: String,
    #[serde(default = "default_compression")]
    pub compression: Compression,
    #[serde(default = "default_parallelism")]
    pub parallelism: Parallelism,
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    #[serde(default = "default_compaction_trigger")]
    pub compaction_trigger: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArmorConfig {
    pub store: StoreSettings,
    pub writer: WriterSettings,
}

impl ArmorConfig {
    pub fn new(path: &str) -> Result<Self, ArmorError> {
        Self::load(path, "ARMOR")
    }

    /// File settings overridden by `<PREFIX>__SECTION__KEY` environment variables.
    pub fn load(path: &str, env_prefix: &str) -> Result<Self, ArmorError> {
        let builder =
            Config::builder()
                .add_source(File::with_name(path).required(true))
                .add_source(Environment::with_prefix(env_prefix).prefix_separator("__").try_parsing(true).separator("__"));
        let config: ArmorConfig = builder.build()?.try_deserialize()?;
        if config.writer.shard_count == 0 {
            return Err(ArmorError::Custom("writer.shard_count must be > 0".to_string()));
        }
        Ok(config)
    }

    pub fn backend(&self) -> Result<Arc<dyn StorageBackend>, ArmorError> {
        match self.store.backend {
            BackendKind::File if self.store.base_path.is_empty() => Err(ArmorError::Custom("store.base_path is required by the file backend".to_string())),
            BackendKind::File => Ok(Arc::new(FileBackend::new(&self.store.base_path)?)),
            BackendKind::Memory => Ok(Arc::new(MemoryObjectStore::new())),
        }
    }
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use crate::storage::test_utils::temp_dir;

    #[test]
    fn parallelism_parses_and_never_maps_to_zero() {
        assert_eq!("HIGH".parse::<Parallelism>().unwrap(), Parallelism::High);
        assert!("warp".parse::<Parallelism>().is_err());
        for p in [Parallelism::Off, Parallelism::Low, Parallelism::Mild, Parallelism::High] {
            assert!(usize::from(p) >= 1);
        }
        assert_eq!(usize::from(Parallelism::Off), 1);
    }

    #[test]
    fn file_settings_fill_defaults() {
        let dir = temp_dir("settings");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("armor.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n\n[writer]\nname = \"w1\"\nparallelism = \"off\"\n").unwrap();
        let config = ArmorConfig::load(path.to_str().unwrap(), "ARMOR_SETTINGS_TEST").unwrap();
        assert_eq!(config.store.backend, BackendKind::Memory);
        assert_eq!(config.writer.name, "w1");
        assert_eq!(config.writer.compression, Compression::Zstd);
        assert_eq!(config.writer.parallelism, Parallelism::Off);
        assert_eq!(config.writer.shard_count, 1);
        assert_eq!(config.writer.compaction_trigger, 50);
        assert_eq!(config.backend().unwrap().name(), "memory");
    }

    #[test]
    fn missing_files_and_zero_shards_are_rejected() {
        assert!(matches!(ArmorConfig::load("/nonexistent/armor", "ARMOR_SETTINGS_TEST"), Err(ArmorError::Config(_))));
        let dir = temp_dir("settings_zero");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("armor.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n\n[writer]\nname = \"w1\"\nshard_count = 0\n").unwrap();
        assert!(ArmorConfig::load(path.to_str().unwrap(), "ARMOR_SETTINGS_TEST").is_err());
    }
}
