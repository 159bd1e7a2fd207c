//! Configuration management with serde serialization/deserialization
//!
//! Holds every process-wide setting of the capture service: listener port,
//! page concurrency, queue bound, browser timeouts, the security gates and
//! the Chrome launch arguments derived from them.

use crate::{CaptureError, SecurityConfig};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Main configuration structure for the screenshot service
///
/// # Examples
///
/// ```rust
/// use screenshot_service::Config;
///
/// let config = Config {
///     max_concurrency: 4,
///     ..Default::default()
/// };
/// assert_eq!(config.port, 3000);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener port (default: 3000)
    pub port: u16,

    /// Maximum number of pages rendering at the same time (default: 10)
    ///
    /// Only the pooled strategy enforces it; every extra request waits for a
    /// free slot in arrival order.
    pub max_concurrency: usize,

    /// Maximum number of requests allowed to wait for a slot (default: 100)
    ///
    /// Requests beyond this are rejected with a 503 instead of queuing.
    pub max_queue_depth: usize,

    /// Navigation timeout, also used as the browser command timeout (default: 5 minutes)
    #[serde(rename = "navigation_timeout_secs", with = "duration_secs")]
    pub navigation_timeout: Duration,

    /// Browser process startup timeout (default: 5 minutes)
    ///
    /// Cold starts on a loaded machine can take minutes.
    #[serde(rename = "launch_timeout_secs", with = "duration_secs")]
    pub launch_timeout: Duration,

    /// Path to the Chrome/Chromium executable (default: auto-detect)
    ///
    /// Serverless hosts point this at their pre-packaged binary.
    pub chrome_path: Option<String>,

    /// How browser pages are provisioned (default: pooled)
    pub strategy: ProviderStrategy,

    /// Verbose logging and per-request access logs (default: false)
    pub dev_mode: bool,

    /// Serve Prometheus metrics on `/metrics` (default: false)
    pub metrics_enabled: bool,

    /// Authentication token and destination allow-list
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            max_concurrency: 10,
            max_queue_depth: 100,
            navigation_timeout: Duration::from_secs(300),
            launch_timeout: Duration::from_secs(300),
            chrome_path: None,
            strategy: ProviderStrategy::Pooled,
            dev_mode: false,
            metrics_enabled: false,
            security: SecurityConfig::default(),
        }
    }
}

/// Whole seconds in the config file, matching the command-line flags.
mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Browser resource provisioning model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStrategy {
    /// Long-lived browser shared by a bounded set of isolated page contexts
    #[default]
    Pooled,
    /// Warm-cached browser, one page opened and closed per request
    Ephemeral,
}

/// Rejects settings the service cannot run with.
pub fn validate_config(config: &Config) -> Result<(), CaptureError> {
    if config.max_concurrency == 0 {
        return Err(CaptureError::Internal(
            "Max concurrency must be greater than 0".to_string(),
        ));
    }

    if config.navigation_timeout.is_zero() {
        return Err(CaptureError::Internal(
            "Navigation timeout must be greater than 0".to_string(),
        ));
    }

    if config.launch_timeout.is_zero() {
        return Err(CaptureError::Internal(
            "Browser launch timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Arguments every browser is launched with.
///
/// Font hinting and color profile flags keep renders identical across hosts.
pub const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--font-render-hinting=none",
    "--disable-font-subpixel-positioning",
    "--force-color-profile=srgb",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-features=TranslateUI",
    "--disable-extensions",
    "--disable-default-apps",
    "--disable-sync",
    "--no-first-run",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Generate Chrome command-line arguments based on configuration
///
/// # Examples
///
/// ```rust
/// use screenshot_service::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--force-color-profile=srgb".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let mut args: Vec<String> = CHROME_ARGS.iter().map(|a| a.to_string()).collect();

    if config.strategy == ProviderStrategy::Ephemeral {
        // Serverless sandboxes have a single core and a read-only filesystem.
        args.push("--single-process".to_string());
        args.push("--no-zygote".to_string());
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, CaptureError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .launch_timeout(config.launch_timeout)
        .request_timeout(config.navigation_timeout)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CaptureError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.max_queue_depth, 100);
        assert_eq!(config.navigation_timeout, Duration::from_secs(300));
        assert_eq!(config.strategy, ProviderStrategy::Pooled);
        assert!(!config.dev_mode);
        assert!(config.security.auth_token.is_none());
        assert!(config.security.host_whitelist.is_empty());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let config = Config {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"port": 8080, "strategy": "ephemeral", "security": {"host_whitelist": ["example.com"]}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.strategy, ProviderStrategy::Ephemeral);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.security.host_whitelist, vec!["example.com".to_string()]);
    }

    #[test]
    fn timeouts_are_whole_seconds_in_json() {
        let config: Config =
            serde_json::from_str(r#"{"navigation_timeout_secs": 60, "launch_timeout_secs": 120}"#)
                .unwrap();
        assert_eq!(config.navigation_timeout, Duration::from_secs(60));
        assert_eq!(config.launch_timeout, Duration::from_secs(120));

        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["navigation_timeout_secs"], 300);
        assert_eq!(json["launch_timeout_secs"], 300);
    }

    #[test]
    fn chrome_args_pin_rendering() {
        let args = get_chrome_args(&Config::default());
        assert!(args.contains(&"--font-render-hinting=none".to_string()));
        assert!(args.contains(&"--disable-font-subpixel-positioning".to_string()));
        assert!(!args.contains(&"--single-process".to_string()));

        let ephemeral = get_chrome_args(&Config {
            strategy: ProviderStrategy::Ephemeral,
            ..Default::default()
        });
        assert!(ephemeral.contains(&"--single-process".to_string()));
    }
}
