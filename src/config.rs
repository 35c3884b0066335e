use clap::{Args, Parser};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub ber: BerConfig,
    pub logging: LoggingConfig,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Bounded worker pool size for the analyzer fan-out (spec.md §4.7 step 2).
    pub pool_size: usize,
    /// Per-analyzer timeout; an analyzer that overruns this degrades to an
    /// empty result rather than blocking the whole request.
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub analyzer_timeout_secs: u64,
    /// Row cap applied to every `<name>_data` preview the edge exposes.
    pub preview_row_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BerConfig {
    /// Symbol BER critical threshold (spec.md §6 `IBA_BER_TH`).
    pub critical_threshold: f64,
    /// Symbol BER warning threshold (spec.md §6 `IBA_BER_WARN_TH`).
    pub warning_threshold: f64,
    /// Minimum error count before cross-checking raw/effective BER
    /// (spec.md §6 `IBA_BER_FALLBACK_MIN`).
    pub fallback_min_errors: u64,
    /// Below this log10 value, symbol BER is considered unreliable
    /// (spec.md §6 `IBA_BER_SYMBOL_VALID_MIN_LOG10`).
    pub symbol_valid_min_log10: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TopologyConfig {
    /// Optional baseline topology JSON path (spec.md §6 `EXPECTED_TOPOLOGY_FILE`).
    pub expected_topology_file: Option<String>,
}

/// Command line arguments for configuration overrides. Derives [`Args`]
/// rather than [`Parser`] so a binary with its own top-level subcommands
/// (the `ibhealth` CLI) can `#[command(flatten)]` these flags instead of
/// parsing argv a second time.
#[derive(Args, Debug, Clone)]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Worker pool size (overrides config file)
    #[arg(long, value_name = "N")]
    pub worker_pool_size: Option<usize>,

    /// Per-analyzer timeout (overrides config file, e.g., "10s", "1m")
    #[arg(long, value_name = "DURATION")]
    pub analyzer_timeout_secs: Option<String>,

    /// Preview row cap (overrides config file)
    #[arg(long, value_name = "N")]
    pub preview_row_limit: Option<usize>,

    /// Symbol BER critical threshold (overrides config file)
    #[arg(long, value_name = "FLOAT")]
    pub ber_critical_threshold: Option<f64>,

    /// Symbol BER warning threshold (overrides config file)
    #[arg(long, value_name = "FLOAT")]
    pub ber_warning_threshold: Option<f64>,

    /// Logging level (overrides config file, e.g., "info,ibhealth=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Expected topology baseline file (overrides config file)
    #[arg(long, value_name = "PATH")]
    pub expected_topology_file: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (`IBA_*`, spec.md §6)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        #[derive(Parser)]
        #[command(name = "ibhealth")]
        #[command(version, about = "InfiniBand fabric health check")]
        struct StandaloneArgs {
            #[command(flatten)]
            inner: CommandLineArgs,
        }
        let cli_args = StandaloneArgs::parse().inner;
        Self::from_args(&cli_args)
    }

    /// Same loading order as [`Config::load`], but takes an already-parsed
    /// [`CommandLineArgs`] — for binaries (like the `ibhealth` CLI) that
    /// flatten these flags into their own subcommand-bearing `clap` struct
    /// rather than parsing argv a second time.
    pub fn from_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables (spec.md §6):
    /// - `IBA_BER_TH`, `IBA_BER_WARN_TH`, `IBA_BER_FALLBACK_MIN`,
    ///   `IBA_BER_SYMBOL_VALID_MIN_LOG10`
    /// - `EXPECTED_TOPOLOGY_FILE`
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("IBA_BER_TH")
            && let Ok(val) = val.parse()
        {
            self.ber.critical_threshold = val;
            tracing::info!(value = val, "override ber.critical_threshold from env");
        }

        if let Ok(val) = std::env::var("IBA_BER_WARN_TH")
            && let Ok(val) = val.parse()
        {
            self.ber.warning_threshold = val;
            tracing::info!(value = val, "override ber.warning_threshold from env");
        }

        if let Ok(val) = std::env::var("IBA_BER_FALLBACK_MIN")
            && let Ok(val) = val.parse()
        {
            self.ber.fallback_min_errors = val;
            tracing::info!(value = val, "override ber.fallback_min_errors from env");
        }

        if let Ok(val) = std::env::var("IBA_BER_SYMBOL_VALID_MIN_LOG10")
            && let Ok(val) = val.parse()
        {
            self.ber.symbol_valid_min_log10 = val;
            tracing::info!(value = val, "override ber.symbol_valid_min_log10 from env");
        }

        if let Ok(path) = std::env::var("EXPECTED_TOPOLOGY_FILE") {
            self.topology.expected_topology_file = Some(path);
            tracing::info!("override topology.expected_topology_file from env");
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(n) = args.worker_pool_size {
            self.worker.pool_size = n;
            tracing::info!(n, "override worker.pool_size from CLI");
        }

        if let Some(timeout) = &args.analyzer_timeout_secs {
            match parse_duration_to_secs(timeout) {
                Ok(val) => {
                    self.worker.analyzer_timeout_secs = val;
                    tracing::info!(val, "override worker.analyzer_timeout_secs from CLI");
                },
                Err(e) => tracing::warn!(
                    "invalid --analyzer-timeout-secs '{timeout}': {e} (keep {})",
                    self.worker.analyzer_timeout_secs
                ),
            }
        }

        if let Some(n) = args.preview_row_limit {
            self.worker.preview_row_limit = n;
            tracing::info!(n, "override worker.preview_row_limit from CLI");
        }

        if let Some(val) = args.ber_critical_threshold {
            self.ber.critical_threshold = val;
            tracing::info!(val, "override ber.critical_threshold from CLI");
        }

        if let Some(val) = args.ber_warning_threshold {
            self.ber.warning_threshold = val;
            tracing::info!(val, "override ber.warning_threshold from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!(level, "override logging.level from CLI");
        }

        if let Some(path) = &args.expected_topology_file {
            self.topology.expected_topology_file = Some(path.clone());
            tracing::info!("override topology.expected_topology_file from CLI");
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.worker.pool_size == 0 {
            anyhow::bail!("worker.pool_size must be > 0");
        }
        if self.worker.analyzer_timeout_secs == 0 {
            anyhow::bail!("worker.analyzer_timeout_secs must be > 0");
        }
        if !(self.ber.critical_threshold > 0.0) || !(self.ber.warning_threshold > 0.0) {
            anyhow::bail!("ber thresholds must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        possible_paths.iter().find(|p| Path::new(p).exists()).map(|p| p.to_string())
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { pool_size: 4, analyzer_timeout_secs: 30, preview_row_limit: 1000 }
    }
}

impl Default for BerConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 1e-12,
            warning_threshold: 1e-15,
            fallback_min_errors: 1024,
            symbol_valid_min_log10: -60.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,ibhealth=debug".to_string(), file: None }
    }
}

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        _ => Err(format!("unsupported unit: {unit}")),
    }
}

/// Custom deserializer so the config file can write either `30` or `"30s"`.
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut config = Config::default();
        config.worker.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_human_friendly_durations() {
        assert_eq!(parse_duration_to_secs("30").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
    }
}
