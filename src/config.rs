use crate::error::{ProxyProbeError, Result};
use crate::models::{CaptureMode, ProxyConfig};
use crate::scheduler::{Schedule, DEFAULT_COUNT, DEFAULT_INTERVAL};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Probe configuration
    pub probe: ProbeConfig,
    /// Ordered proxy pool
    pub proxies: Vec<ProxyConfig>,
    /// Logging configuration
    pub log: LogConfig,
}

/// Which entry point the binary runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Repeating schedule
    Schedule,
    /// One probe, then exit
    Single,
}

impl RunMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "schedule" | "scheduled" | "loop" => Some(RunMode::Schedule),
            "single" | "once" => Some(RunMode::Single),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Schedule => "schedule",
            RunMode::Single => "single",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Target URL probed on every tick
    pub target_url: String,
    /// Interval between probe starts (default: 1000ms)
    pub interval: Duration,
    /// Number of probes per run (default: 10)
    pub count: usize,
    /// Route probes through the proxy pool (default: true for schedule, false for single)
    pub use_proxy: bool,
    /// Entry point (default: schedule)
    pub mode: RunMode,
    /// Explicit pool index for a single probe
    pub proxy_index: Option<usize>,
    /// Response capture policy (default: raw)
    pub capture: CaptureMode,
    /// Transport request timeout (default: 30s)
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let target_url = env::var("PROBE_TARGET_URL")
            .map_err(|_| ProxyProbeError::MissingEnvVar("PROBE_TARGET_URL".into()))?;
        let target_url = parse_target(&target_url)?;

        let mode = RunMode::from_str(&get_env_or("PROBE_MODE", "schedule")).ok_or_else(|| {
            ProxyProbeError::InvalidConfig("PROBE_MODE must be 'schedule' or 'single'".into())
        })?;

        let default_use_proxy = match mode {
            RunMode::Schedule => "true",
            RunMode::Single => "false",
        };

        let default_interval = DEFAULT_INTERVAL.as_millis().to_string();
        let interval_ms: u64 = get_env_or("PROBE_INTERVAL_MS", &default_interval)
            .parse()
            .map_err(|_| {
                ProxyProbeError::InvalidConfig("PROBE_INTERVAL_MS must be a valid number".into())
            })?;
        if interval_ms == 0 {
            return Err(ProxyProbeError::InvalidConfig(
                "PROBE_INTERVAL_MS must be greater than zero".into(),
            ));
        }

        let capture = CaptureMode::from_str(&get_env_or("PROBE_CAPTURE", "raw")).ok_or_else(|| {
            ProxyProbeError::InvalidConfig("PROBE_CAPTURE must be 'raw' or 'json'".into())
        })?;

        let timeout_secs: u64 = get_env_or("PROBE_TIMEOUT_SECS", "30").parse().map_err(|_| {
            ProxyProbeError::InvalidConfig("PROBE_TIMEOUT_SECS must be a valid number".into())
        })?;
        if timeout_secs == 0 {
            return Err(ProxyProbeError::InvalidConfig(
                "PROBE_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        let proxy_index = match env::var("PROBE_PROXY_INDEX") {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse().map_err(|_| {
                ProxyProbeError::InvalidConfig("PROBE_PROXY_INDEX must be a valid index".into())
            })?),
            _ => None,
        };

        let mut proxies = parse_proxy_list(&get_env_or("PROBE_PROXIES", ""))?;
        if let Ok(path) = env::var("PROBE_PROXY_FILE") {
            if !path.trim().is_empty() {
                proxies.extend(load_proxy_file(Path::new(path.trim()))?);
            }
        }

        Ok(Config {
            probe: ProbeConfig {
                target_url,
                interval: Duration::from_millis(interval_ms),
                count: get_env_or("PROBE_COUNT", &DEFAULT_COUNT.to_string())
                    .parse()
                    .map_err(|_| {
                        ProxyProbeError::InvalidConfig("PROBE_COUNT must be a valid number".into())
                    })?,
                use_proxy: get_env_or("PROBE_USE_PROXY", default_use_proxy)
                    .parse()
                    .map_err(|_| {
                        ProxyProbeError::InvalidConfig(
                            "PROBE_USE_PROXY must be 'true' or 'false'".into(),
                        )
                    })?,
                mode,
                proxy_index,
                capture,
                request_timeout: Duration::from_secs(timeout_secs),
            },
            proxies,
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Schedule parameters for a repeating run
    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: self.probe.interval,
            count: self.probe.count,
            use_proxy: self.probe.use_proxy,
        }
    }
}

fn parse_target(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        ProxyProbeError::InvalidConfig(format!("PROBE_TARGET_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ProxyProbeError::InvalidConfig(format!(
            "PROBE_TARGET_URL has unsupported scheme: {}",
            other
        ))),
    }
}

/// Parse `ip:port:username:password` entries separated by commas or newlines
pub fn parse_proxy_list(raw: &str) -> Result<Vec<ProxyConfig>> {
    raw.split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && !entry.starts_with('#'))
        .map(str::parse)
        .collect()
}

/// Load a JSON array of `{ip, port, username, password}` objects
pub fn load_proxy_file(path: &Path) -> Result<Vec<ProxyConfig>> {
    let raw = std::fs::read_to_string(path)?;
    let proxies: Vec<ProxyConfig> = serde_json::from_str(&raw).map_err(|e| {
        ProxyProbeError::InvalidConfig(format!(
            "PROBE_PROXY_FILE {} is not a valid proxy list: {}",
            path.display(),
            e
        ))
    })?;

    for proxy in &proxies {
        proxy.validate()?;
    }
    Ok(proxies)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
