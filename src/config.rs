use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

use crate::matching::CompatibilityMode;
use crate::store::sqlite::DEFAULT_CHANGE_BUFFER;

#[derive(Parser, Debug)]
#[command(name = "skillswap", about = "Skill-exchange matching engine")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database (overrides [database] path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, global = true)]
    pub as_user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Publish a skill post
    Post {
        #[arg(long)]
        teach: String,
        #[arg(long)]
        teach_category: String,
        #[arg(long)]
        learn: String,
        #[arg(long)]
        learn_category: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List posts compatible with the user's active posts
    Candidates {
        /// category, exact or exact_or_category
        #[arg(long)]
        mode: Option<CompatibilityMode>,
        /// Post id to list first
        #[arg(long)]
        highlight: Option<String>,
    },
    /// Match one of your posts with a candidate post
    Match {
        user_post: String,
        candidate_post: String,
    },
    /// Delete a match and its messages
    Unmatch { match_id: String },
    /// List the user's matches
    Matches,
    /// Delete a post with its matches and messages
    DeletePost { post_id: String },
    /// Remove records that reference deleted users or matches
    Sweep {
        /// Keep sweeping every N seconds until interrupted
        #[arg(long)]
        every: Option<u64>,
    },
    /// Delete the user's account and everything it owns
    DeleteAccount {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub sweeper: SweeperConfig,
    pub notifications: NotificationsConfig,
    pub store: StoreConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct MatchingConfig {
    pub mode: CompatibilityMode,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub change_buffer: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref db) = cli.db {
            config.database.path = Some(db.clone());
        }

        // Resolve paths relative to data dir
        match &config.database.path {
            None => config.database.path = Some(data_dir.join("skillswap.db")),
            Some(path) if path.is_relative() => {
                config.database.path = Some(data_dir.join(path));
            }
            Some(_) => {}
        }

        if config.sweeper.interval_secs == 0 {
            anyhow::bail!("[sweeper] interval_secs must be at least 1");
        }
        if config.store.change_buffer == 0 {
            anyhow::bail!("[store] change_buffer must be at least 1");
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".skillswap"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> anyhow::Result<&PathBuf> {
        self.database
            .path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("database path not resolved; use Config::load"))
    }
}
