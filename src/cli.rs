use crate::config::ClusteringConfig;
use crate::errors::{AppError, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

#[derive(Debug, Clone, Parser)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct CliArgs {
    #[arg(value_name = "CONFIG")]
    config_positional: Option<String>,
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
    #[arg(long = "parallel")]
    parallel: Option<String>,
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    debug: bool,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterArgs {
    pub config: String,
    pub parallel: Option<usize>,
    pub debug: bool,
    pub progress: bool,
}

impl ClusterArgs {
    pub fn validate(&self) -> Result<()> {
        if self.config.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--config".to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_overrides(&self, config: &mut ClusteringConfig) {
        if let Some(parallel) = self.parallel {
            config.clustering_parallel_processes = parallel;
        }
        if self.debug {
            config.debug = true;
        }
    }
}

pub fn parse_from_env() -> Result<ClusterArgs> {
    parse_args(std::env::args())
}

pub fn parse_args<I, S>(args: I) -> Result<ClusterArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push("svclust".to_string());
    }

    let cli = CliArgs::try_parse_from(tokens).map_err(map_clap_error)?;

    let parsed = ClusterArgs {
        config: cli.config.or(cli.config_positional).unwrap_or_default(),
        parallel: cli
            .parallel
            .as_deref()
            .map(|value| parse_usize("--parallel", value))
            .transpose()?,
        debug: cli.debug,
        progress: cli.progress,
    };

    parsed.validate()?;
    Ok(parsed)
}

fn map_clap_error(error: clap::Error) -> AppError {
    let kind = error.kind();
    let rendered = error.to_string();
    match kind {
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: first_quoted_token(&rendered).unwrap_or(rendered),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
        },
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn first_quoted_token(message: &str) -> Option<String> {
    let start = message.find('\'')?;
    let end = message[start + 1..].find('\'')?;
    Some(message[start + 1..start + 1 + end].to_string())
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

fn parse_usize(flag: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| AppError::InvalidValue {
        key: flag.to_string(),
        value: value.to_string(),
        reason: "must be a positive integer".to_string(),
    })
}
