use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::system::process::RankingPolicy;
use crate::system::source::SourceKind;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub source: SourceConfig,
    pub processes: ProcessesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    /// Number of snapshots to take; 0 runs until interrupted.
    pub iterations: u64,
    pub output: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 2000,
            iterations: 0,
            output: OutputFormat::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub proc_root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            kind: SourceKind::Auto,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessesConfig {
    pub ranking: RankingPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!(
                "unknown output `{other}` (expected json, pretty or summary)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Pretty => "pretty",
            OutputFormat::Summary => "summary",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hostpulse").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.general.refresh_rate_ms, 2000);
        assert_eq!(config.general.iterations, 0);
        assert_eq!(config.general.output, OutputFormat::Json);
        assert_eq!(config.source.kind, SourceKind::Auto);
        assert_eq!(config.source.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.processes.ranking, RankingPolicy::ResidentMemory);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[general]
refresh_rate_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.refresh_rate_ms, 500);
        // Other fields should be defaults
        assert_eq!(config.general.output, OutputFormat::Json);
        assert_eq!(config.source.kind, SourceKind::Auto);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[general]
refresh_rate_ms = 1000
iterations = 5
output = "summary"

[source]
kind = "sysinfo"
proc_root = "/host/proc"

[processes]
ranking = "enumeration"

[logging]
level = "debug"
format = "json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.refresh_rate_ms, 1000);
        assert_eq!(config.general.iterations, 5);
        assert_eq!(config.general.output, OutputFormat::Summary);
        assert_eq!(config.source.kind, SourceKind::Sysinfo);
        assert_eq!(config.source.proc_root, PathBuf::from("/host/proc"));
        assert_eq!(config.processes.ranking, RankingPolicy::EnumerationOrder);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn output_format_parses_from_cli_strings() {
        assert_eq!("Pretty".parse::<OutputFormat>(), Ok(OutputFormat::Pretty));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn missing_file_returns_default() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.general.refresh_rate_ms, 2000);
    }

    #[test]
    fn invalid_toml_returns_default() {
        let temp = std::env::temp_dir().join("hostpulse_test_invalid.toml");
        std::fs::write(&temp, "this is not valid toml {{{{").unwrap();
        let config = load_config_from_path(&temp);
        assert_eq!(config.general.refresh_rate_ms, 2000);
        let _ = std::fs::remove_file(&temp);
    }
}
