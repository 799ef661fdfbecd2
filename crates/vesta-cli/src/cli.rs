//! CLI argument parsing for vesta

use clap::Parser;
use std::path::PathBuf;

/// Run a scenario through the Vesta execution engine
#[derive(Parser, Debug, Clone)]
#[command(name = "vesta")]
#[command(about = "Run a genesis + blocks scenario through the Vesta execution engine")]
#[command(version)]
pub struct Cli {
    /// Scenario file (JSON with `genesis` and `blocks`)
    pub scenario: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// State directory; overrides `data_dir` from the config
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Pretty-print the result
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["vesta", "scenario.json"]);
        assert_eq!(cli.scenario, PathBuf::from("scenario.json"));
        assert!(cli.config.is_none());
        assert!(cli.data_dir.is_none());
        assert_eq!(cli.log_level, "warn");
        assert!(!cli.json_logs);
        assert!(!cli.pretty);
    }

    #[test]
    fn test_cli_custom_args() {
        let cli = Cli::parse_from([
            "vesta",
            "run.json",
            "--config",
            "vesta.toml",
            "--data-dir",
            "/tmp/vesta",
            "--log-level",
            "debug",
            "--json-logs",
            "--pretty",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("vesta.toml")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/vesta")));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
        assert!(cli.pretty);
    }

    #[test]
    fn test_cli_requires_scenario() {
        assert!(Cli::try_parse_from(["vesta"]).is_err());
    }
}
