use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const HANDOFF_DIR: &str = "tmp";

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_parallel() -> usize {
    1
}

fn default_stats_file() -> String {
    "clustering_stats.yaml".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringConfig {
    pub working_dir: PathBuf,
    pub sam_files_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    pub chromosomes: Vec<String>,
    #[serde(default = "default_parallel")]
    pub clustering_parallel_processes: usize,
    #[serde(default, deserialize_with = "bool_from_flag")]
    pub debug: bool,
    #[serde(default)]
    pub clustering_log_file: Option<String>,
    #[serde(default = "default_stats_file")]
    pub serialized_stats_file: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::new(),
            sam_files_dir: "sam_files".to_string(),
            results_dir: default_results_dir(),
            chromosomes: Vec::new(),
            clustering_parallel_processes: default_parallel(),
            debug: false,
            clustering_log_file: None,
            serialized_stats_file: default_stats_file(),
        }
    }
}

impl ClusteringConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|error| AppError::InvalidValue {
            key: "--config".to_string(),
            value: path.display().to_string(),
            reason: error.to_string(),
        })?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(AppError::MissingRequired {
                field: "working_dir".to_string(),
            });
        }
        if self.sam_files_dir.is_empty() {
            return Err(AppError::MissingRequired {
                field: "sam_files_dir".to_string(),
            });
        }
        if self.chromosomes.is_empty() {
            return Err(AppError::MissingRequired {
                field: "chromosomes".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for chromosome in &self.chromosomes {
            if chromosome.is_empty() {
                return Err(AppError::InvalidValue {
                    key: "chromosomes".to_string(),
                    value: String::new(),
                    reason: "chromosome names must be non-empty".to_string(),
                });
            }
            if !seen.insert(chromosome.as_str()) {
                return Err(AppError::InvalidValue {
                    key: "chromosomes".to_string(),
                    value: chromosome.clone(),
                    reason: "duplicate chromosome entry".to_string(),
                });
            }
        }
        if self.clustering_parallel_processes == 0 {
            return Err(AppError::InvalidValue {
                key: "clustering_parallel_processes".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn check_dirs(&self) -> Result<()> {
        if !self.working_dir.is_dir() {
            return Err(AppError::InvalidValue {
                key: "working_dir".to_string(),
                value: self.working_dir.display().to_string(),
                reason: "directory does not exist".to_string(),
            });
        }
        let sam_dir = self.sam_dir();
        if !sam_dir.is_dir() {
            return Err(AppError::InvalidValue {
                key: "sam_files_dir".to_string(),
                value: sam_dir.display().to_string(),
                reason: "directory does not exist".to_string(),
            });
        }
        fs::create_dir_all(self.results_dir_path())?;
        Ok(())
    }

    pub fn sam_dir(&self) -> PathBuf {
        self.working_dir.join(&self.sam_files_dir)
    }

    pub fn results_dir_path(&self) -> PathBuf {
        self.working_dir.join(&self.results_dir)
    }

    pub fn handoff_dir(&self) -> PathBuf {
        self.working_dir.join(HANDOFF_DIR)
    }

    pub fn stats_output_path(&self) -> PathBuf {
        self.results_dir_path().join(&self.serialized_stats_file)
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.clustering_log_file
            .as_ref()
            .map(|name| self.working_dir.join(name))
    }
}

fn bool_from_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Int(value) => Ok(value != 0),
    }
}

#[cfg(test)]
mod tests {
    use super::ClusteringConfig;
    use crate::errors::AppError;
    use std::path::PathBuf;

    fn parse(yaml: &str) -> serde_yaml::Result<ClusteringConfig> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let config = parse(
            "working_dir: /data/run\nsam_files_dir: alignments\nchromosomes: [\"1\", \"2\"]\n",
        )
        .expect("expected parse success");

        assert_eq!(config.working_dir, PathBuf::from("/data/run"));
        assert_eq!(config.sam_files_dir, "alignments");
        assert_eq!(config.results_dir, "results");
        assert_eq!(config.clustering_parallel_processes, 1);
        assert!(!config.debug);
        assert!(config.clustering_log_file.is_none());
        assert_eq!(config.serialized_stats_file, "clustering_stats.yaml");
        config.validate().expect("expected valid config");
    }

    #[test]
    fn accepts_integer_debug_flag() {
        let config = parse(
            "working_dir: /data/run\nsam_files_dir: sam\nchromosomes: [\"1\"]\ndebug: 1\n",
        )
        .expect("expected parse success");
        assert!(config.debug);

        let config = parse(
            "working_dir: /data/run\nsam_files_dir: sam\nchromosomes: [\"1\"]\ndebug: false\n",
        )
        .expect("expected parse success");
        assert!(!config.debug);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result = parse(
            "working_dir: /data/run\nsam_files_dir: sam\nchromosomes: [\"1\"]\nresuls_dir: out\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(parse("sam_files_dir: sam\nchromosomes: [\"1\"]\n").is_err());
        assert!(parse("working_dir: /data/run\nchromosomes: [\"1\"]\n").is_err());
    }

    #[test]
    fn validate_rejects_empty_chromosome_list() {
        let config = ClusteringConfig {
            working_dir: PathBuf::from("/data/run"),
            chromosomes: Vec::new(),
            ..ClusteringConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AppError::MissingRequired { field }) if field == "chromosomes"
        ));
    }

    #[test]
    fn validate_rejects_duplicate_chromosomes() {
        let config = ClusteringConfig {
            working_dir: PathBuf::from("/data/run"),
            chromosomes: vec!["1".to_string(), "2".to_string(), "1".to_string()],
            ..ClusteringConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AppError::InvalidValue { key, value, .. }) if key == "chromosomes" && value == "1"
        ));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = ClusteringConfig {
            working_dir: PathBuf::from("/data/run"),
            chromosomes: vec!["1".to_string()],
            clustering_parallel_processes: 0,
            ..ClusteringConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn paths_compose_under_working_dir() {
        let config = ClusteringConfig {
            working_dir: PathBuf::from("/data/run"),
            sam_files_dir: "alignments".to_string(),
            chromosomes: vec!["1".to_string()],
            clustering_log_file: Some("clustering.log".to_string()),
            ..ClusteringConfig::default()
        };
        assert_eq!(config.sam_dir(), PathBuf::from("/data/run/alignments"));
        assert_eq!(config.results_dir_path(), PathBuf::from("/data/run/results"));
        assert_eq!(config.handoff_dir(), PathBuf::from("/data/run/tmp"));
        assert_eq!(
            config.stats_output_path(),
            PathBuf::from("/data/run/results/clustering_stats.yaml")
        );
        assert_eq!(
            config.log_file_path(),
            Some(PathBuf::from("/data/run/clustering.log"))
        );
    }
}
