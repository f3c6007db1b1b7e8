use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the scoped-settings binary.
#[derive(Debug, Parser)]
#[command(
    name = "scoped-settings",
    version,
    about = "Resolve scoped settings for sites and requests"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SCOPED_SETTINGS_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List registered settings types.
    List,
    /// Resolve settings keys within one request and one render context.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Host header of the simulated request. Without it the render context
    /// carries no request.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port the simulated request arrived on; defaults to the port in the
    /// host header, then 80.
    #[arg(long, value_name = "PORT", requires = "host")]
    pub port: Option<u16>,

    /// Resolve site-scoped settings for the default site.
    #[arg(long = "default-site", action = clap::ArgAction::SetTrue)]
    pub default_site: bool,

    /// Keys such as `tests.TestSetting` or field expressions such as
    /// `tests.TestSetting.title`.
    #[arg(value_name = "KEY", required = true, num_args = 1..)]
    pub keys: Vec<String>,
}
