use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cluster::Cluster;
use crate::errors::Result;
use crate::fragment::Fragment;
use crate::stats::AggregatedStats;

pub const CLUSTER_HEADER: [&str; 11] = [
    "first.chr",
    "begin.lo",
    "begin.hi",
    "second.chr",
    "end.lo",
    "end.hi",
    "direction",
    "support",
    "orientation.mismatch",
    "low.confidence",
    "fragments",
];

pub fn write_cluster_header<W: Write + ?Sized>(writer: &mut W) -> Result<()> {
    writer.write_all(CLUSTER_HEADER.join("\t").as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn write_clusters(path: &Path, clusters: &[Cluster]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_cluster_header(&mut file)?;
    for cluster in clusters {
        write_cluster_line(&mut file, cluster)?;
    }
    file.flush()?;
    Ok(())
}

fn write_cluster_line<W: Write + ?Sized>(writer: &mut W, cluster: &Cluster) -> Result<()> {
    let Some(first) = cluster.fragments.first() else {
        return Ok(());
    };
    let (begin_lo, begin_hi) = cluster.begin_range();
    let (end_lo, end_hi) = cluster.end_range();
    let names: Vec<&str> = cluster
        .fragments
        .iter()
        .map(|fragment| fragment.name.as_str())
        .collect();
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        first.first_chr,
        begin_lo,
        begin_hi,
        first.second_chr,
        end_lo,
        end_hi,
        cluster.direction,
        cluster.support(),
        u8::from(cluster.orientation_mismatch),
        u8::from(cluster.low_confidence),
        names.join(","),
    )?;
    Ok(())
}

/// Appends normal fragments to the chromosome's output file, creating it on
/// first use. Returns the number of fragments written.
pub fn append_normal_fragments<'a, I>(path: &Path, fragments: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a Fragment>,
{
    let mut file = BufWriter::new(OpenOptions::new().create(true).append(true).open(path)?);
    let mut written = 0;
    for fragment in fragments {
        writeln!(file, "{fragment}")?;
        written += 1;
    }
    file.flush()?;
    Ok(written)
}

pub fn write_aggregated_stats(path: &Path, stats: &AggregatedStats) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(serde_yaml::to_string(stats)?.as_bytes())?;
    file.flush()?;
    Ok(())
}

pub fn normal_output_path(results_dir: &Path, chromosome: &str) -> PathBuf {
    results_dir.join(format!("normal_{chromosome}.tsv"))
}

pub fn intra_clusters_path(results_dir: &Path, chromosome: &str) -> PathBuf {
    results_dir.join(format!("clusters_{chromosome}.tsv"))
}

pub fn pair_clusters_path(results_dir: &Path, first: &str, second: &str) -> PathBuf {
    results_dir.join(format!("clusters_{first}_{second}.tsv"))
}
