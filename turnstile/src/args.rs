use std::{fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::bail;
use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

/// Crates whose logs follow `--log`. Everything else logs at `warn`.
const WORKSPACE_CRATES: &[&str] = &["turnstile", "server", "admission", "config", "telemetry"];

const DEFAULT_CONFIG_PATH: &str = "./turnstile.toml";

#[derive(Debug, Parser)]
#[command(name = "Turnstile", version, about = "Multi-tenant request admission")]
pub struct Args {
    /// Address to listen on, overriding `server.listen_address`. Default: 127.0.0.1:8000
    #[arg(short, long, env = "TURNSTILE_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// TOML configuration file. Turnstile starts on defaults when the default path does not exist.
    #[arg(long, short, env = "TURNSTILE_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub check_config: bool,
    #[arg(long = "log", env = "TURNSTILE_LOG", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    #[arg(long, env = "TURNSTILE_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
}

impl Args {
    /// Loads the configuration. A missing file is only tolerated at the default path.
    pub fn config(&self) -> anyhow::Result<Config> {
        if self.config.exists() {
            return Config::load(&self.config);
        }

        if self.config != PathBuf::from(DEFAULT_CONFIG_PATH) {
            bail!("Configuration file {} does not exist", self.config.display());
        }

        log::info!("No configuration at {DEFAULT_CONFIG_PATH}, admission is disabled");

        Ok(Config::default())
    }
}

/// Log output format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Coloured text, the default on a terminal
    Color,
    /// Plain text, the default otherwise
    Text,
    /// One JSON object per line
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stdout().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        })
    }
}

/// Verbosity of the workspace crates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let directives = match self {
            LogLevel::Off => "off".to_string(),
            level => WORKSPACE_CRATES
                .iter()
                .fold(String::from("warn"), |acc, krate| format!("{acc},{krate}={level}")),
        };

        EnvFilter::from_str(&directives).expect("These all are valid env filters.")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}
