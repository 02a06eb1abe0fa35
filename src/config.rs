use crate::core::{Amount, GenesisConfig};
use crate::crypto::hash::Hash160;
use crate::crypto::keys::parse_owner;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mining: MiningConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub genesis: GenesisSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    pub difficulty_bits: u32,
    pub threads: usize,
    pub block_reward: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rest: bool,
    pub rest_port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisSettings {
    /// Hex owner hash or base58 address credited by the genesis coinbase.
    pub owner: String,
    pub reward: Amount,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mining: MiningConfig {
                difficulty_bits: crate::mining::DEFAULT_DIFFICULTY_BITS,
                threads: num_cpus::get(),
                block_reward: Amount::from_coins(50),
            },
            storage: StorageConfig {
                data_dir: Self::home_dir().join("data"),
            },
            api: ApiConfig {
                enable_rest: true,
                rest_port: 8080,
                cors_origins: vec!["*".to_string()],
            },
            genesis: GenesisSettings {
                owner: Hash160::hash_sha256(b"genesis_address_hash").to_hex(),
                reward: Amount::from_coins(50),
            },
        }
    }
}

impl Config {
    /// Reads `path` (or the default location), writing defaults there on
    /// first run.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn genesis_config(&self) -> anyhow::Result<GenesisConfig> {
        let owner = parse_owner(&self.genesis.owner)
            .map_err(|e| anyhow::anyhow!("Invalid genesis owner {:?}: {}", self.genesis.owner, e))?;

        Ok(GenesisConfig {
            owner_hash: owner.to_vec(),
            reward: self.genesis.reward,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join("ledger.db")
    }

    fn home_dir() -> PathBuf {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home_dir).join(".pow-ledger")
    }

    fn config_path() -> PathBuf {
        Self::home_dir().join("config.json")
    }
}
