//! Configuration for insurance-predictor
//!
//! CLI arguments (clap, with environment fallbacks) layered over an optional
//! TOML file. Flags win over file values, file values win over defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::auth::PasswordScheme;
use crate::error::{PredictorError, Result};

/// Health insurance cost prediction service
#[derive(Parser, Debug, Clone)]
#[command(name = "insurance-predictor")]
#[command(about = "Predicts health insurance cost from personal and health attributes")]
pub struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "PREDICTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Directory holding users.json, the history CSV and generated reports
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Training dataset (CSV with age,sex,bmi,children,smoker,region,charges)
    #[arg(long, env = "DATASET_PATH")]
    pub dataset: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Resolve the effective configuration
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(ref dataset) = self.dataset {
            config.dataset_path = dataset.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Credential file name, relative to `data_dir` unless absolute
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,

    /// Prediction history file name, relative to `data_dir` unless absolute
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Report output directory, relative to `data_dir` unless absolute
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Hash scheme for new registrations; both formats always verify
    #[serde(default)]
    pub password_scheme: PasswordScheme,

    /// Seconds a session stays valid after login
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_scheme: PasswordScheme::default(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Regressor training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Seed shared by the train/test split and the bootstrap sampler
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            seed: default_seed(),
            test_fraction: default_test_fraction(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("insurance.csv")
}

fn default_users_file() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("predictions_history.csv")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_n_trees() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_test_fraction() -> f64 {
    0.2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            dataset_path: default_dataset_path(),
            users_file: default_users_file(),
            history_file: default_history_file(),
            reports_dir: default_reports_dir(),
            auth: AuthConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| PredictorError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Create a config rooted at `data_dir`, everything else default
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.data_dir.join(&self.reports_dir)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.session_ttl_secs == 0 {
            return Err(PredictorError::Config("auth.session_ttl_secs must be at least 1".into()));
        }
        if self.model.n_trees == 0 {
            return Err(PredictorError::Config("model.n_trees must be at least 1".into()));
        }
        if !(self.model.test_fraction > 0.0 && self.model.test_fraction < 1.0) {
            return Err(PredictorError::Config(
                "model.test_fraction must be between 0 and 1 (exclusive)".into(),
            ));
        }
        Ok(())
    }
}
