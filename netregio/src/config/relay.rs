use clap::Args;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::magic::RelativePathBuf,
    Figment,
};
use serde::{Deserialize, Serialize};

use super::TracingGuard;

#[derive(Deserialize, Serialize, Debug)]
pub struct RelayConfig {
    pub(crate) redis_url: String,
    /// Exchange the relay's queue lives under. Empty means the default
    /// exchange, so the stream key is the bare queue name.
    pub(crate) exchange: String,
    pub(crate) queue: String,
    /// Hard timeout on every downstream HTTP call.
    #[serde(with = "humantime_serde")]
    pub(crate) http_timeout: std::time::Duration,
    pub(crate) log_path: Option<RelativePathBuf>,
    pub(crate) file_log: bool,
}

#[derive(Args, Debug, Serialize, Default)]
#[command(rename_all = "kebab-case")]
pub struct RelayConfigCli {
    /// The path of the config file
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub config: Option<String>,
    /// The Redis URL of the broker
    #[arg(long = "redis")]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub redis_url: Option<String>,
    /// The exchange to bind the relay queue under
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub exchange: Option<String>,
    /// The queue to consume relay messages from
    #[arg(short, long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub queue: Option<String>,
    /// The downstream HTTP call timeout, default to 1 second
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub http_timeout: Option<String>,
    /// The log file path. If not specified, then the default rolling log file path would be used.
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub log_path: Option<String>,
    /// Enable logging to file
    #[arg(long)]
    pub file_log: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            exchange: String::new(),
            queue: "regio.relay".to_string(),
            http_timeout: std::time::Duration::from_secs(1),
            log_path: None,
            file_log: false,
        }
    }
}

impl RelayConfig {
    pub fn new(cli: &RelayConfigCli) -> crate::error::Result<Self> {
        Ok(Figment::new()
            .merge(Serialized::from(Self::default(), "relay"))
            .merge(Toml::file(cli.config.as_deref().unwrap_or("config.toml")).nested())
            .merge(Env::prefixed("REGIO_").profile("relay"))
            .merge(Serialized::from(cli, "relay"))
            .select("relay")
            .extract()?)
    }

    pub fn setup_tracing_subscriber(&self) -> crate::error::Result<TracingGuard> {
        super::setup_tracing_subscriber(self.log_path.as_ref(), self.file_log, "relay")
    }
}
