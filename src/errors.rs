use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing value for argument: {flag}")]
    MissingValue { flag: String },
    #[error("missing required field: {field}")]
    MissingRequired { field: String },
    #[error("invalid value for {key}={value}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("unsupported argument: {arg}")]
    UnsupportedArgument { arg: String },
    #[error("unsupported input {path}: {reason}")]
    UnsupportedInput { path: String, reason: String },
    #[error("parse error: {message}")]
    ParseError { message: String },
    #[error("invalid clustering thresholds: max distance {max_dist} is below min distance {min_dist}")]
    InvalidThresholds { max_dist: f64, min_dist: f64 },
    #[error("no alignment input for chromosome {chromosome} in {dir}")]
    MissingInput { chromosome: String, dir: String },
    #[error("missing hand-off artifact for chromosome {chromosome}: {path}")]
    MissingArtifact { chromosome: String, path: String },
    #[error("corrupt hand-off artifact for chromosome {chromosome} at {path}: {source}")]
    CorruptArtifact {
        chromosome: String,
        path: String,
        source: Box<AppError>,
    },
    #[error("{failed} of {total} chromosome workers failed: {chromosomes}")]
    WorkersFailed {
        failed: usize,
        total: usize,
        chromosomes: String,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
