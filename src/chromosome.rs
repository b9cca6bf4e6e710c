use crate::cluster::{cluster_fragments, Cluster, ClusterParams};
use crate::config::ClusteringConfig;
use crate::errors::Result;
use crate::fragment::{Direction, Fragment};
use crate::handoff::HandoffStore;
use crate::sam::{self, DecodeTally};
use crate::stats;
use crate::writer;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeSummary {
    pub chromosome: String,
    pub fragments: u64,
    pub normal: u64,
    pub abnormal: u64,
    pub translocations: u64,
    pub intra_clusters: u64,
    pub malformed: u64,
    pub off_target: u64,
    pub filtered: u64,
}

/// Runs the whole per-chromosome pass: decode every matching alignment
/// file, derive the normal-length window, split normal from abnormal,
/// cluster the intra-chromosomal abnormals and park stats plus
/// translocations for the aggregation step.
pub fn process_chromosome(
    config: &ClusteringConfig,
    store: &HandoffStore,
    chromosome: &str,
) -> Result<ChromosomeSummary> {
    let inputs = sam::inputs_for_chromosome(&config.sam_dir(), chromosome)?;
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut tally = DecodeTally::default();
    for path in &inputs {
        debug!(chromosome, path = %path.display(), "decoding alignment file");
        let (mut decoded, file_tally) = sam::load_fragments(path, chromosome, &config.chromosomes)?;
        fragments.append(&mut decoded);
        tally.merge(&file_tally);
    }
    if tally.malformed > 0 {
        warn!(
            chromosome,
            malformed = tally.malformed,
            "skipped malformed alignment records"
        );
    }

    let window = stats::derive_normal_window(&fragments);
    if window.is_none() {
        warn!(
            chromosome,
            "no intra-chromosomal fragments; treating every fragment as abnormal"
        );
    }
    stats::classify(&mut fragments, window.as_ref());
    let chr_stats = stats::build_stats(&fragments, window.as_ref());

    let results_dir = config.results_dir_path();
    let normal = writer::append_normal_fragments(
        &writer::normal_output_path(&results_dir, chromosome),
        fragments.iter().filter(|fragment| !fragment.is_abnormal),
    )? as u64;

    let mut intra: Vec<Fragment> = Vec::new();
    let mut translocations: Vec<Fragment> = Vec::new();
    for fragment in &fragments {
        if !fragment.is_abnormal {
            continue;
        }
        if fragment.is_intra() {
            intra.push(fragment.clone());
        } else {
            translocations.push(fragment.clone());
        }
    }
    store.put_translocations(chromosome, &translocations)?;

    let params = ClusterParams {
        max_dist: chr_stats.max_dist(),
        min_dist: chr_stats.smallest_normal as f64,
        expected_direction: chr_stats.flag_direction,
    };
    let mut clusters: Vec<Cluster> = Vec::new();
    for direction in Direction::ALL {
        let class: Vec<Fragment> = intra
            .iter()
            .filter(|fragment| fragment.direction == direction)
            .cloned()
            .collect();
        if class.is_empty() {
            continue;
        }
        clusters.extend(cluster_fragments(&class, &params)?);
    }
    writer::write_clusters(
        &writer::intra_clusters_path(&results_dir, chromosome),
        &clusters,
    )?;
    store.put_stats(chromosome, &chr_stats)?;

    let summary = ChromosomeSummary {
        chromosome: chromosome.to_string(),
        fragments: fragments.len() as u64,
        normal,
        abnormal: chr_stats.num_all_abn,
        translocations: translocations.len() as u64,
        intra_clusters: clusters.len() as u64,
        malformed: tally.malformed,
        off_target: tally.off_target,
        filtered: tally.filtered,
    };
    info!(
        chromosome,
        fragments = summary.fragments,
        normal = summary.normal,
        abnormal = summary.abnormal,
        translocations = summary.translocations,
        intra_clusters = summary.intra_clusters,
        "chromosome pass complete"
    );
    Ok(summary)
}
