use crate::errors::{AppError, Result};
use crate::fragment::Fragment;
use crate::stats::ChromosomeStats;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;

/// Durable per-chromosome hand-off between workers and aggregation. Each
/// artifact is written once, read once and removed on read, so a leftover
/// file means an unconsumed worker and a missing one a failed worker.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    root: PathBuf,
}

impl HandoffStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn stats_path(&self, chromosome: &str) -> PathBuf {
        self.root.join(format!("stats_{chromosome}.yaml"))
    }

    pub fn translocations_path(&self, chromosome: &str) -> PathBuf {
        self.root.join(format!("trans_{chromosome}.tsv"))
    }

    pub fn put_stats(&self, chromosome: &str, stats: &ChromosomeStats) -> Result<()> {
        let text = serde_yaml::to_string(stats)?;
        self.persist_bytes(&self.stats_path(chromosome), text.as_bytes())
    }

    pub fn put_translocations(&self, chromosome: &str, fragments: &[Fragment]) -> Result<()> {
        let mut text = String::new();
        for fragment in fragments {
            text.push_str(&fragment.to_string());
            text.push('\n');
        }
        self.persist_bytes(&self.translocations_path(chromosome), text.as_bytes())
    }

    pub fn take_stats(&self, chromosome: &str) -> Result<ChromosomeStats> {
        let path = self.stats_path(chromosome);
        let file = File::open(&path).map_err(|_| AppError::MissingArtifact {
            chromosome: chromosome.to_string(),
            path: path.display().to_string(),
        })?;
        let stats = serde_yaml::from_reader(BufReader::new(file))
            .map_err(|error| corrupt_artifact(chromosome, &path, AppError::Yaml(error)))?;
        fs::remove_file(&path)?;
        Ok(stats)
    }

    pub fn take_translocations(&self, chromosome: &str) -> Result<Vec<Fragment>> {
        let path = self.translocations_path(chromosome);
        let file = File::open(&path).map_err(|_| AppError::MissingArtifact {
            chromosome: chromosome.to_string(),
            path: path.display().to_string(),
        })?;
        let mut fragments = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fragment = Fragment::from_string(&line)
                .map_err(|error| corrupt_artifact(chromosome, &path, error))?;
            fragments.push(fragment);
        }
        fs::remove_file(&path)?;
        Ok(fragments)
    }

    /// Removes artifacts left behind by an earlier aborted run, so a fresh
    /// run can never consume another run's hand-off data. Returns the number
    /// of files removed.
    pub fn clear_leftovers(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.starts_with("stats_")
                || name.starts_with("trans_")
                || name.starts_with("svclust_handoff_")
            {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn persist_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp = Builder::new()
            .prefix("svclust_handoff_")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(bytes)?;
            writer.flush()?;
        }
        // persist can fail across filesystems; fall back to a plain copy
        if let Err(error) = temp.persist(path) {
            let mut source = File::open(error.file.path())?;
            let mut target = BufWriter::new(File::create(path)?);
            io::copy(&mut source, &mut target)?;
            target.flush()?;
        }
        Ok(())
    }
}

fn corrupt_artifact(chromosome: &str, path: &Path, source: AppError) -> AppError {
    AppError::CorruptArtifact {
        chromosome: chromosome.to_string(),
        path: path.display().to_string(),
        source: Box::new(source),
    }
}
