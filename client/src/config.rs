//! Client-side configuration: the constants named in the specification's
//! External Interfaces section, sourced the same way as the server's
//! [`signaler`-side `Conf`](../../src/config.rs) — `config`/`dotenv`
//! layered over compiled-in defaults, `Duration`s spelled with
//! `humantime-serde`.

use std::time::Duration;

use serde::Deserialize;
use smart_default::SmartDefault;

/// Negotiation/connection-manager tunables, per spec.md §6 Configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct Conf {
    /// The signaling server's WebSocket URL. No compiled-in default: this
    /// must come from the environment (`SIGNAL_CLIENT__SERVER_URL`) or a
    /// config file, matching the specification's "client peer-server URL
    /// (environment variable)".
    #[serde(default)]
    pub server_url: Option<String>,

    #[default(10)]
    pub max_peer_connections: usize,

    #[default(_code = "Duration::from_secs(30)")]
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    #[default(_code = "Duration::from_secs(60)")]
    #[serde(with = "humantime_serde")]
    pub stale_threshold: Duration,

    #[default(_code = "Duration::from_millis(300)")]
    #[serde(with = "humantime_serde")]
    pub negotiation_debounce: Duration,

    #[default(_code = "Duration::from_secs(5)")]
    #[serde(with = "humantime_serde")]
    pub disconnect_grace: Duration,

    #[default(_code = "Duration::from_secs(2)")]
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    #[default(_code = "Duration::from_millis(500)")]
    #[serde(with = "humantime_serde")]
    pub stream_swap_delay: Duration,

    #[default(_code = "Duration::from_secs(25)")]
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,

    #[default(_code = "Duration::from_secs(60)")]
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,

    #[default(_code = "default_stun_servers()")]
    pub stun_servers: Vec<String>,
}

fn default_stun_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}

impl Conf {
    /// Parses configuration from `.env`/environment, layered over compiled
    /// defaults.
    pub fn parse() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let mut cfg = config::Config::new();
        cfg.merge(config::File::with_name("config").required(false))?;
        cfg.merge(
            config::Environment::with_prefix("SIGNAL_CLIENT").separator("__"),
        )?;

        match cfg.try_into::<Self>() {
            Ok(conf) => Ok(conf),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}
