use crate::{Config, ProviderStrategy, SecurityConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(name = "screenshot-service")]
#[command(about = "HTTP service that renders web pages to PNG, JPEG or WebP")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(short = 'p', long, env = "PORT", help = "HTTP listener port")]
    pub port: Option<u16>,

    #[arg(long, env = "MAX_CONCURRENCY", help = "Maximum pages rendering at once")]
    pub max_concurrency: Option<usize>,

    #[arg(long, env = "MAX_QUEUE_DEPTH", help = "Maximum requests waiting for a page")]
    pub max_queue_depth: Option<usize>,

    #[arg(
        long,
        env = "SCREENSHOT_AUTH_TOKEN",
        hide_env_values = true,
        help = "Bearer token required on /screenshot"
    )]
    pub auth_token: Option<String>,

    #[arg(
        long,
        env = "SCREENSHOT_HOST_WHITELIST",
        help = "Comma-separated hostnames that may be captured"
    )]
    pub host_whitelist: Option<String>,

    #[arg(long = "env", env = "SCREENSHOT_ENV", help = "Runtime environment (development enables request logs)")]
    pub environment: Option<String>,

    #[arg(long, env = "CHROME_PATH", help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, value_enum, env = "SCREENSHOT_STRATEGY", help = "Page provisioning strategy")]
    pub strategy: Option<ProviderStrategy>,

    #[arg(long, env = "NAVIGATION_TIMEOUT_SECS", help = "Navigation timeout in seconds")]
    pub navigation_timeout: Option<u64>,

    #[arg(long, env = "LAUNCH_TIMEOUT_SECS", help = "Browser launch timeout in seconds")]
    pub launch_timeout: Option<u64>,

    #[arg(long, env = "SCREENSHOT_METRICS", help = "Serve Prometheus metrics on /metrics")]
    pub metrics: bool,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    pub fn dev_mode(&self) -> bool {
        self.environment.as_deref() == Some("development")
    }

    /// Debug-level logs when asked for or when the resolved config is in dev mode.
    pub fn verbose_logging(&self, config: &Config) -> bool {
        self.verbose || config.dev_mode
    }

    /// Applies flags and environment variables on top of `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }

        if let Some(max_concurrency) = self.max_concurrency {
            config.max_concurrency = max_concurrency;
        }

        if let Some(max_queue_depth) = self.max_queue_depth {
            config.max_queue_depth = max_queue_depth;
        }

        if let Some(timeout) = self.navigation_timeout {
            config.navigation_timeout = Duration::from_secs(timeout);
        }

        if let Some(timeout) = self.launch_timeout {
            config.launch_timeout = Duration::from_secs(timeout);
        }

        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }

        config.dev_mode |= self.dev_mode();
        config.metrics_enabled |= self.metrics;

        // File values go through the same normalization as flags.
        let current = config.security;
        let token = self.auth_token.clone().or(current.auth_token);
        let whitelist = match self.host_whitelist.as_deref() {
            Some(raw) => crate::parse_host_whitelist(raw),
            None => current.host_whitelist,
        };
        config.security = SecurityConfig::new(token, whitelist);

        config
    }
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}
