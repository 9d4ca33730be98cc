//! # Configuration Management Module
//!
//! Settings for the world core, loaded from TOML. The [`WorldConfig`] section is handed
//! to [`World::new`](crate::world::World::new) at startup and stays read-only afterwards;
//! there are no process-wide mutable defaults.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [world]
//! default_max_items = 125
//! default_max_weight = 400
//! max_stack_amount = 60000
//!
//! [world.corpse]
//! decay_minutes = 7
//! instanced_loot_minutes = 3
//!
//! [world.bank]
//! send_remove_on_close = true
//!
//! [containers]
//! table = "data/containers.cfg"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "mushcore.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::container::ContainerDataRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub containers: ContainersConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Capacity defaults and timings injected into the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Item limit for containers carrying the `-1` sentinel.
    #[serde(default = "default_max_items")]
    pub default_max_items: i32,
    /// Weight limit in stones for containers without an override.
    #[serde(default = "default_max_weight")]
    pub default_max_weight: i32,
    #[serde(default = "default_max_stack_amount")]
    pub max_stack_amount: u32,
    #[serde(default = "default_item_serial_start")]
    pub item_serial_start: u32,
    #[serde(default = "default_mobile_serial_start")]
    pub mobile_serial_start: u32,
    #[serde(default)]
    pub corpse: CorpseConfig,
    #[serde(default)]
    pub bank: BankConfig,
}

fn default_max_items() -> i32 {
    125
}

fn default_max_weight() -> i32 {
    400
}

fn default_max_stack_amount() -> u32 {
    crate::world::item::DEFAULT_MAX_STACK_AMOUNT
}

fn default_item_serial_start() -> u32 {
    0x4000_0000
}

fn default_mobile_serial_start() -> u32 {
    1
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            default_max_items: default_max_items(),
            default_max_weight: default_max_weight(),
            max_stack_amount: default_max_stack_amount(),
            item_serial_start: default_item_serial_start(),
            mobile_serial_start: default_mobile_serial_start(),
            corpse: CorpseConfig::default(),
            bank: BankConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpseConfig {
    /// Delay for each decay step (fresh to bones, bones to gone).
    pub decay_minutes: u32,
    /// How long after death instanced loot stays private to its assignee.
    pub instanced_loot_minutes: u32,
}

impl Default for CorpseConfig {
    fn default() -> Self {
        Self {
            decay_minutes: 7,
            instanced_loot_minutes: 3,
        }
    }
}

impl CorpseConfig {
    pub fn decay_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.decay_minutes as i64)
    }

    pub fn instanced_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.instanced_loot_minutes as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Tell the owner's client to drop the bank gump when the box closes.
    pub send_remove_on_close: bool,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            send_remove_on_close: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainersConfig {
    /// Tab-separated container display table.
    pub table: String,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            table: "data/containers.cfg".to_string(),
        }
    }
}

impl ContainersConfig {
    pub fn load_registry(&self) -> Result<ContainerDataRegistry> {
        ContainerDataRegistry::load(&self.table)
            .map_err(|e| anyhow!("Failed to load container table {}: {}", self.table, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional override for the world database path; defaults to `<data_dir>/world`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl StorageConfig {
    pub fn world_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("world"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            world: WorldConfig::default(),
            containers: ContainersConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                db_path: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("mushcore.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_config_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.default_max_items, 125);
        assert_eq!(config.default_max_weight, 400);
        assert_eq!(config.max_stack_amount, 60_000);
        assert_eq!(config.corpse.decay_minutes, 7);
        assert_eq!(config.corpse.instanced_loot_minutes, 3);
        assert!(config.bank.send_remove_on_close);
    }

    #[test]
    fn test_partial_world_section_fills_defaults() {
        let text = r#"
            [world]
            default_max_items = 40

            [world.corpse]
            decay_minutes = 2
            instanced_loot_minutes = 1

            [storage]
            data_dir = "/tmp/world"

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.world.default_max_items, 40);
        assert_eq!(config.world.default_max_weight, 400);
        assert_eq!(config.world.corpse.decay_minutes, 2);
        assert!(config.world.bank.send_remove_on_close);
        assert_eq!(config.containers.table, "data/containers.cfg");
        assert_eq!(config.logging.file, None);
        assert_eq!(
            config.storage.world_db_path(),
            PathBuf::from("/tmp/world").join("world")
        );
    }

    #[test]
    fn test_default_config_survives_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.world, config.world);
        assert_eq!(back.storage.world_db_path(), config.storage.world_db_path());
    }

    #[tokio::test]
    async fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.world, WorldConfig::default());
        assert_eq!(config.logging.level, "info");

        let missing = dir.path().join("missing.toml");
        assert!(Config::load(missing.to_str().unwrap()).await.is_err());
    }
}
