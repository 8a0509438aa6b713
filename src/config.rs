//! Runtime configuration: layered `config`/`dotenv` sourcing of the
//! constants called out by the specification's External Interfaces section.

use std::time::Duration;

use serde::Deserialize;
use smart_default::SmartDefault;

/// Server-wide configuration.
///
/// Sourced, in increasing priority, from compiled-in defaults, an optional
/// `config.toml` in the working directory, and environment variables
/// prefixed `SIGNALER_` (double underscore as the section separator, e.g.
/// `SIGNALER_SERVER__BIND_PORT`).
#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct Conf {
    #[default(_code = "ServerConf::default()")]
    pub server: ServerConf,

    #[default(_code = "RoomConf::default()")]
    pub room: RoomConf,

    #[default(_code = "HeartbeatConf::default()")]
    pub heartbeat: HeartbeatConf,
}

/// HTTP/WebSocket listener configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct ServerConf {
    #[default(3000)]
    pub bind_port: u16,

    #[default(_code = "\"0.0.0.0\".to_string()")]
    pub bind_ip: String,
}

/// Room-registry-derived constants used by server-side bookkeeping. Mirrors
/// [`crate::config::Conf::room`]; the client-side counterparts of the same
/// constants live in `signal_client::config`.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct RoomConf {}

/// Transport heartbeat, per the specification's External Interfaces section:
/// "Transport configured with 25 s ping interval, 60 s ping timeout."
#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct HeartbeatConf {
    #[default(_code = "Duration::from_secs(25)")]
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,

    #[default(_code = "Duration::from_secs(60)")]
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
}

impl Conf {
    /// Parses configuration from `config.toml` (if present) layered with
    /// environment variables, falling back to compiled-in defaults for
    /// anything neither source specifies.
    pub fn parse() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let mut cfg = config::Config::new();
        cfg.merge(config::File::with_name("config").required(false))?;
        cfg.merge(
            config::Environment::with_prefix("SIGNALER").separator("__"),
        )?;

        match cfg.try_into::<Self>() {
            Ok(conf) => Ok(conf),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

impl ServerConf {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.bind_port)
    }
}
