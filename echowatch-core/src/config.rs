use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct EchowatchConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,
    /// Only scans tagged with this game are considered ready.
    #[serde(default = "default_game_tag")]
    pub game_tag: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            // Deliberately below the Echo API's throttling threshold.
            interval_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub snapshot_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "sessions.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub capacity: usize,
    pub mirror_path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            mirror_path: "echowatch-events.jsonl".to_string(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.echo.ac".to_string()
}

fn default_api_timeout() -> u64 {
    10
}

fn default_game_tag() -> String {
    "GTA-V RP".to_string()
}

fn default_gateway_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

impl EchowatchConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("ECHOWATCH").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
