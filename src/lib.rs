#[cfg(feature = "htslib-input")]
pub mod bam;
pub mod chromosome;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod fragment;
pub mod handoff;
pub mod pipeline;
pub mod sam;
pub mod stats;
pub mod writer;

use cli::ClusterArgs;
use config::ClusteringConfig;
use errors::Result;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing(config: &ClusteringConfig) {
    TRACING_INIT.call_once(|| {
        let default_level = if config.debug { "debug" } else { "info" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        match config.log_file_path() {
            Some(path) => match File::create(&path) {
                Ok(file) => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(file))
                        .try_init();
                }
                Err(error) => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_target(false)
                        .try_init();
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "failed to open log file; logging to stderr"
                    );
                }
            },
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(false)
                    .try_init();
            }
        }
    });
}

pub fn run_from_args(args: ClusterArgs) -> Result<()> {
    let mut config = ClusteringConfig::from_yaml_file(Path::new(&args.config))?;
    args.apply_overrides(&mut config);
    init_tracing(&config);
    pipeline::run(&config, args.progress)
}
