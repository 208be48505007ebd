//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "Screenmeter bridge", version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default. Invalid
    /// arguments print usage and exit, as clap does for derived parsers.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .get_matches();

        <Self as clap::FromArgMatches>::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    /// Parse CLI arguments (requires --config to be specified).
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Logging configuration with the `--log-level` override applied.
    pub fn logging_override(&self, base: &crate::LoggingConfig) -> crate::LoggingConfig {
        match &self.log_level {
            Some(level) => crate::LoggingConfig {
                level: level.clone(),
                format: base.format,
            },
            None => base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenmeter_common::LogFormat;

    #[test]
    fn test_parse_from_explicit_args() {
        let args = BridgeArgs::try_parse_from([
            "zenoh-bridge-screenmeter",
            "--config",
            "perla.json5",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("perla.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_log_level_override_keeps_format() {
        let args = BridgeArgs {
            config: PathBuf::from("perla.json5"),
            log_level: Some("trace".to_string()),
        };
        let base = crate::LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Json,
        };

        let effective = args.logging_override(&base);
        assert_eq!(effective.level, "trace");
        assert_eq!(effective.format, LogFormat::Json);
    }

    #[test]
    fn test_no_override_returns_base() {
        let args = BridgeArgs {
            config: PathBuf::from("perla.json5"),
            log_level: None,
        };
        let base = crate::LoggingConfig::default();

        assert_eq!(args.logging_override(&base).level, "info");
    }
}
