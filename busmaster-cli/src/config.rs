//! Configuration loading and merging
//!
//! A TOML file can hold every setting of a run; command-line arguments take
//! precedence over it.

use crate::export::{ExportOptions, OutputFormat};
use anyhow::{bail, Context, Result};
use busmaster_decoder::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_OUTPUT: &str = "output.csv";
const DEFAULT_JSON_OUTPUT: &str = "output.jsonl";

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub decoding: DecodingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub delimiter: Option<char>,
    pub precision: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecodingConfig {
    pub parallel: Option<bool>,
    pub skip_empty_rows: Option<bool>,
    pub channels: Option<Vec<u8>>,
    pub message_ids: Option<Vec<u32>>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Settings given on the command line; unset fields fall through to the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_file: Option<PathBuf>,
    pub dbc_files: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub delimiter: Option<char>,
    pub precision: Option<usize>,
    pub sequential: bool,
    pub skip_empty: bool,
    pub channels: Vec<u8>,
    pub message_ids: Vec<u32>,
}

/// Fully resolved settings of one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub log_file: PathBuf,
    pub dbc_files: Vec<PathBuf>,
    pub output: PathBuf,
    pub export: ExportOptions,
    pub decoder: DecoderConfig,
}

impl RunSettings {
    /// Merge command-line values over the config file
    ///
    /// DBC files given on the command line replace the configured list
    /// rather than extending it; the same holds for channel and message
    /// filters.
    pub fn resolve(cli: CliOverrides, file: AppConfig) -> Result<Self> {
        let Some(log_file) = cli.log_file.or(file.input.log_file) else {
            bail!("No log file given (pass LOG_FILE or set input.log_file in the config)");
        };

        let dbc_files = if cli.dbc_files.is_empty() {
            file.input.dbc_files
        } else {
            cli.dbc_files
        };
        if dbc_files.is_empty() {
            bail!("No DBC file given (pass DBC_FILE or set input.dbc_files in the config)");
        }

        let output_path = cli.output.or(file.output.path);
        let format = cli
            .format
            .or(file.output.format)
            .or_else(|| output_path.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Csv);
        let output = output_path.unwrap_or_else(|| {
            PathBuf::from(match format {
                OutputFormat::Csv => DEFAULT_OUTPUT,
                OutputFormat::Json => DEFAULT_JSON_OUTPUT,
            })
        });

        let export = ExportOptions {
            format,
            delimiter: cli.delimiter.or(file.output.delimiter).unwrap_or(';'),
            precision: cli.precision.or(file.output.precision),
        };

        let mut decoder = DecoderConfig::new()
            .with_parallel(!cli.sequential && file.decoding.parallel.unwrap_or(true))
            .with_empty_rows(!(cli.skip_empty || file.decoding.skip_empty_rows.unwrap_or(false)));

        let channels = if cli.channels.is_empty() {
            file.decoding.channels
        } else {
            Some(cli.channels)
        };
        if let Some(channels) = channels {
            decoder = decoder.with_channel_filter(channels);
        }

        let message_ids = if cli.message_ids.is_empty() {
            file.decoding.message_ids
        } else {
            Some(cli.message_ids)
        };
        if let Some(message_ids) = message_ids {
            decoder = decoder.with_message_filter(message_ids);
        }

        Ok(Self {
            log_file,
            dbc_files,
            output,
            export,
            decoder,
        })
    }

    /// Fail early on input files that don't exist
    pub fn check_inputs(&self) -> Result<()> {
        if !self.log_file.is_file() {
            bail!("Log file not found: {:?}", self.log_file);
        }
        for dbc in &self.dbc_files {
            if !dbc.is_file() {
                bail!("DBC file not found: {:?}", dbc);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            log_file = "trace.log"
            dbc_files = ["powertrain.dbc", "chassis.dbc"]

            [output]
            path = "decoded.csv"
            delimiter = ","
            precision = 3

            [decoding]
            parallel = false
            channels = [1, 2]
            message_ids = [0x136, 0x18FFF4E5]
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.log_file, Some(PathBuf::from("trace.log")));
        assert_eq!(config.input.dbc_files.len(), 2);
        assert_eq!(config.output.delimiter, Some(','));
        assert_eq!(config.decoding.message_ids, Some(vec![0x136, 0x18FF_F4E5]));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str("[output]\nseparator = \",\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = CliOverrides {
            log_file: Some("trace.log".into()),
            dbc_files: vec!["a.dbc".into()],
            ..CliOverrides::default()
        };
        let settings = RunSettings::resolve(cli, AppConfig::default()).unwrap();

        assert_eq!(settings.output, PathBuf::from("output.csv"));
        assert_eq!(settings.export.format, OutputFormat::Csv);
        assert_eq!(settings.export.delimiter, ';');
        assert_eq!(settings.export.precision, None);
        assert_eq!(settings.decoder, DecoderConfig::new());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: AppConfig = toml::from_str(
            r#"
            [input]
            log_file = "from_config.log"
            dbc_files = ["config.dbc"]

            [output]
            format = "json"
            delimiter = ","

            [decoding]
            channels = [3]
            skip_empty_rows = true
            "#,
        )
        .unwrap();

        let cli = CliOverrides {
            dbc_files: vec!["cli.dbc".into()],
            delimiter: Some('\t'),
            channels: vec![1],
            sequential: true,
            ..CliOverrides::default()
        };
        let settings = RunSettings::resolve(cli, file).unwrap();

        assert_eq!(settings.log_file, PathBuf::from("from_config.log"));
        assert_eq!(settings.dbc_files, vec![PathBuf::from("cli.dbc")]);
        assert_eq!(settings.export.format, OutputFormat::Json);
        assert_eq!(settings.output, PathBuf::from("output.jsonl"));
        assert_eq!(settings.export.delimiter, '\t');
        assert_eq!(settings.decoder.channel_filter, Some(vec![1]));
        assert!(!settings.decoder.parallel);
        assert!(!settings.decoder.emit_empty_rows);
    }

    #[test]
    fn test_format_follows_output_extension() {
        let cli = CliOverrides {
            log_file: Some("trace.log".into()),
            dbc_files: vec!["a.dbc".into()],
            output: Some("rows.json".into()),
            ..CliOverrides::default()
        };
        let settings = RunSettings::resolve(cli, AppConfig::default()).unwrap();
        assert_eq!(settings.export.format, OutputFormat::Json);
    }

    #[test]
    fn test_missing_inputs() {
        let no_log = CliOverrides {
            dbc_files: vec!["a.dbc".into()],
            ..CliOverrides::default()
        };
        assert!(RunSettings::resolve(no_log, AppConfig::default()).is_err());

        let no_dbc = CliOverrides {
            log_file: Some("trace.log".into()),
            ..CliOverrides::default()
        };
        assert!(RunSettings::resolve(no_dbc, AppConfig::default()).is_err());
    }

    #[test]
    fn test_check_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("trace.log");
        let dbc = dir.path().join("bus.dbc");
        fs::write(&log, "").unwrap();

        let cli = CliOverrides {
            log_file: Some(log),
            dbc_files: vec![dbc.clone()],
            ..CliOverrides::default()
        };
        let settings = RunSettings::resolve(cli, AppConfig::default()).unwrap();
        assert!(settings.check_inputs().is_err());

        fs::write(&dbc, "").unwrap();
        assert!(settings.check_inputs().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[input]\ndbc_files = [\"bus.dbc\"]\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.input.dbc_files, vec![PathBuf::from("bus.dbc")]);
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
