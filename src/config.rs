//! Configuration loader and validator
//!
//! Settings come from built-in defaults, an optional TOML file and the
//! command line, in increasing order of precedence.

use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::gatt::format::format_duration;
use crate::gatt::{
    DEFAULT_CONNECT_DURATION, DEFAULT_DEVICE, DEFAULT_SCAN_DURATION, DEFAULT_SUBSCRIBE_DURATION,
    TARGET_SERVICE_UUID,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line options
#[derive(Debug, Clone, Default, Parser)]
#[command(version, about = "Scan for BLE peripherals and explore their GATT profiles")]
pub struct CliArgs {
    /// Host stack backend: "default" or part of an adapter description (e.g. hci1)
    #[arg(long)]
    pub device: Option<String>,

    /// Scanning duration, 0 for indefinitely
    #[arg(long = "sd", value_name = "DURATION", value_parser = parse_duration)]
    pub scan_duration: Option<Duration>,

    /// Connect duration per device, 0 for indefinitely
    #[arg(long = "cd", value_name = "DURATION", value_parser = parse_duration)]
    pub connect_duration: Option<Duration>,

    /// Subscribe to notifications and indications for this long, 0 to skip
    #[arg(long = "sub", value_name = "DURATION", value_parser = parse_duration)]
    pub subscribe_duration: Option<Duration>,

    /// Allow duplicate advertisement reports
    #[arg(long = "dup", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub allow_duplicates: Option<bool>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host stack backend selector
    #[serde(default = "default_device")]
    pub device: String,

    /// Scan window (0 = until interrupted)
    #[serde(default = "default_scan_duration", with = "duration_text")]
    pub scan_duration: Duration,

    /// Per-device connect window (0 = unbounded)
    #[serde(default = "default_connect_duration", with = "duration_text")]
    pub connect_duration: Duration,

    /// Subscription window per characteristic (0 = no subscriptions)
    #[serde(default = "default_subscribe_duration", with = "duration_text")]
    pub subscribe_duration: Duration,

    /// Forward repeated advertisement reports
    #[serde(default)]
    pub allow_duplicates: bool,

    /// Service a peripheral must expose to be reported
    #[serde(default = "default_target_service")]
    pub target_service: Uuid,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: default_device(),
            scan_duration: default_scan_duration(),
            connect_duration: default_connect_duration(),
            subscribe_duration: default_subscribe_duration(),
            allow_duplicates: false,
            target_service: default_target_service(),
        }
    }
}

fn default_device() -> String { DEFAULT_DEVICE.to_string() }
fn default_scan_duration() -> Duration { DEFAULT_SCAN_DURATION }
fn default_connect_duration() -> Duration { DEFAULT_CONNECT_DURATION }
fn default_subscribe_duration() -> Duration { DEFAULT_SUBSCRIBE_DURATION }
fn default_target_service() -> Uuid { TARGET_SERVICE_UUID }

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::from_toml(&content)?;

        debug!("  - Device: '{}'", config.device);
        debug!("  - Scan duration: {}", format_duration(config.scan_duration));
        debug!("  - Connect duration: {}", format_duration(config.connect_duration));
        debug!("  - Subscribe duration: {}", format_duration(config.subscribe_duration));

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the effective configuration: defaults, then the file named by
    /// `--config`, then the individual flags
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(device) = &args.device {
            config.device = device.clone();
        }
        if let Some(duration) = args.scan_duration {
            config.scan_duration = duration;
        }
        if let Some(duration) = args.connect_duration {
            config.connect_duration = duration;
        }
        if let Some(duration) = args.subscribe_duration {
            config.subscribe_duration = duration;
        }
        if let Some(allow) = args.allow_duplicates {
            config.allow_duplicates = allow;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".into()));
        }

        if self.target_service.is_nil() {
            return Err(ConfigError::Invalid("target_service must not be the nil UUID".into()));
        }

        Ok(())
    }
}

/// Parse a compact duration such as `5s`, `500ms`, `1m30s`, `1.5h` or `0`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Negative values are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || format!("invalid duration '{}'", input);
    let mut total: u128 = 0;
    let mut rest = text;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let (number, after) = rest.split_at(number_len);

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration '{}'", input)),
            other => return Err(format!("unknown unit '{}' in duration '{}'", other, input)),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        total = whole
            .checked_mul(unit_nanos)
            .and_then(|nanos| total.checked_add(nanos))
            .ok_or_else(invalid)?;

        // Digits beyond nanosecond resolution are dropped
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            total = total
                .checked_add(digits * unit_nanos / 10u128.pow(fraction.len() as u32))
                .ok_or_else(invalid)?;
        }

        rest = after;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Serde adapter storing durations in their compact text form
mod duration_text {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("250µs"), Ok(Duration::from_micros(250)));
    }

    #[test]
    fn test_parse_duration_rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration(".s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert!(parse_duration("99999999999999999999999999999999999999h").is_err());
        assert!(parse_duration("340282366920938463463374607431768211455ns1ns").is_err());
        assert!(parse_duration("18446744073709551616s").is_err());

        let args = CliArgs::try_parse_from(["gatt-explorer", "--sd", "99999999999999999999999999999999999999h"]);
        assert!(args.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.device, "default");
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert_eq!(config.connect_duration, Duration::from_secs(1));
        assert_eq!(config.subscribe_duration, Duration::ZERO);
        assert!(!config.allow_duplicates);
        assert_eq!(config.target_service, TARGET_SERVICE_UUID);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            device = "hci1"
            scan_duration = "10s"
            subscribe_duration = "2s"
            "#,
        )
        .unwrap();

        assert_eq!(config.device, "hci1");
        assert_eq!(config.scan_duration, Duration::from_secs(10));
        assert_eq!(config.connect_duration, Duration::from_secs(1));
        assert_eq!(config.subscribe_duration, Duration::from_secs(2));
    }

    #[test]
    fn test_toml_invalid_values() {
        assert!(matches!(
            Config::from_toml("scan_duration = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml("device = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("target_service = \"00000000-0000-0000-0000-000000000000\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_uses_compact_durations() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("scan_duration = \"5s\""));
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_cli_flags() {
        let args = CliArgs::try_parse_from([
            "gatt-explorer", "--sd", "2s", "--cd", "500ms", "--sub", "1s", "--dup", "--device", "hci0",
        ])
        .unwrap();
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.scan_duration, Duration::from_secs(2));
        assert_eq!(config.connect_duration, Duration::from_millis(500));
        assert_eq!(config.subscribe_duration, Duration::from_secs(1));
        assert!(config.allow_duplicates);
        assert_eq!(config.device, "hci0");
    }

    #[test]
    fn test_cli_explicit_bool_and_defaults() {
        let args = CliArgs::try_parse_from(["gatt-explorer", "--dup", "false"]).unwrap();
        let config = Config::from_args(&args).unwrap();
        assert!(!config.allow_duplicates);
        assert_eq!(config.scan_duration, Duration::from_secs(5));

        assert!(CliArgs::try_parse_from(["gatt-explorer", "--sd", "forever"]).is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let path = std::env::temp_dir().join(format!("gatt-explorer-{}.toml", std::process::id()));
        std::fs::write(&path, "scan_duration = \"30s\"\nconnect_duration = \"3s\"\n").unwrap();

        let args = CliArgs {
            scan_duration: Some(Duration::from_secs(1)),
            config: Some(path.clone()),
            ..CliArgs::default()
        };
        let config = Config::from_args(&args).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.scan_duration, Duration::from_secs(1));
        assert_eq!(config.connect_duration, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_config_file() {
        let args = CliArgs {
            config: Some(PathBuf::from("/nonexistent/gatt-explorer.toml")),
            ..CliArgs::default()
        };
        assert!(matches!(Config::from_args(&args), Err(ConfigError::Io(_))));
    }
}
