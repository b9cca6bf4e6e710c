use crate::chromosome::{self, ChromosomeSummary};
use crate::cluster::{cluster_fragments, Cluster, ClusterParams};
use crate::config::ClusteringConfig;
use crate::errors::{AppError, Result};
use crate::fragment::{chrom_eq, Direction, Fragment};
use crate::handoff::HandoffStore;
use crate::stats::AggregatedStats;
use crate::writer;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs the full clustering pipeline: dispatch one worker per configured
/// chromosome, join, then aggregate the per-chromosome hand-off artifacts
/// into pooled statistics and translocation clusters. Worker failures are
/// collected and reported together after the join; aggregation still runs
/// so every surviving chromosome's output is produced.
pub fn run(config: &ClusteringConfig, progress: bool) -> Result<()> {
    config.validate()?;
    config.check_dirs()?;
    let store = HandoffStore::new(config.handoff_dir());
    store.ensure_root()?;
    let stale = store.clear_leftovers()?;
    if stale > 0 {
        warn!(
            removed = stale,
            "cleared stale hand-off artifacts from a previous run"
        );
    }
    info!(
        chromosomes = config.chromosomes.len(),
        parallel = config.clustering_parallel_processes,
        working_dir = %config.working_dir.display(),
        "starting clustering run"
    );

    let outcomes = dispatch_workers(config, &store, progress)?;
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|(_, result)| result.is_err())
        .map(|(chromosome, _)| chromosome.clone())
        .collect();
    if !failed.is_empty() {
        warn!(
            failed = failed.len(),
            total = config.chromosomes.len(),
            chromosomes = %failed.join(","),
            "continuing to aggregation despite failed chromosome workers"
        );
    }

    aggregate(config, &store)?;

    if !failed.is_empty() {
        return Err(AppError::WorkersFailed {
            failed: failed.len(),
            total: config.chromosomes.len(),
            chromosomes: failed.join(","),
        });
    }
    Ok(())
}

fn dispatch_workers(
    config: &ClusteringConfig,
    store: &HandoffStore,
    progress: bool,
) -> Result<Vec<(String, Result<ChromosomeSummary>)>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.clustering_parallel_processes)
        .build()
        .map_err(|err| AppError::ParseError {
            message: format!("failed to initialize rayon thread pool: {err}"),
        })?;

    let mut progress = PipelineProgress::new(
        progress && config.clustering_parallel_processes == 1,
        config.chromosomes.len(),
    );
    let outcomes = pool.install(|| {
        config
            .chromosomes
            .par_iter()
            .map(|chromosome| {
                let started = Instant::now();
                let result = chromosome::process_chromosome(config, store, chromosome);
                match &result {
                    Ok(summary) => info!(
                        chromosome = %chromosome,
                        fragments = summary.fragments,
                        abnormal = summary.abnormal,
                        intra_clusters = summary.intra_clusters,
                        elapsed_ms = started.elapsed().as_millis(),
                        "chromosome worker finished"
                    ),
                    Err(error) => warn!(
                        chromosome = %chromosome,
                        error = %error,
                        "chromosome worker failed"
                    ),
                }
                progress.on_chromosome_done(chromosome);
                (chromosome.clone(), result)
            })
            .collect::<Vec<_>>()
    });
    progress.finish();
    Ok(outcomes)
}

fn aggregate(config: &ClusteringConfig, store: &HandoffStore) -> Result<()> {
    let mut aggregated = AggregatedStats::default();
    let mut pooled: Vec<Fragment> = Vec::new();
    for chromosome in &config.chromosomes {
        let stats = store.take_stats(chromosome)?;
        let translocations = store.take_translocations(chromosome)?;
        info!(
            chromosome = %chromosome,
            num_all_abn = stats.num_all_abn,
            translocations = translocations.len(),
            "merged chromosome hand-off artifacts"
        );
        aggregated.per_chr_stats.insert(chromosome.clone(), stats);
        pooled.extend(translocations);
    }

    let results_dir = config.results_dir_path();
    let mut clustered = 0usize;
    for first in &config.chromosomes {
        for second in &config.chromosomes {
            if first >= second {
                continue;
            }
            let Some(stats) = aggregated.per_chr_stats.get(first) else {
                continue;
            };
            let pair: Vec<Fragment> = pooled
                .iter()
                .filter(|fragment| {
                    chrom_eq(&fragment.first_chr, first) && chrom_eq(&fragment.second_chr, second)
                })
                .cloned()
                .collect();
            if pair.is_empty() {
                continue;
            }
            clustered += pair.len();

            let params = ClusterParams {
                max_dist: stats.max_dist(),
                min_dist: stats.smallest_normal as f64,
                expected_direction: stats.flag_direction,
            };
            let mut clusters: Vec<Cluster> = Vec::new();
            for direction in Direction::ALL {
                let class: Vec<Fragment> = pair
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
                &writer::pair_clusters_path(&results_dir, first, second),
                &clusters,
            )?;
            info!(
                first = %first,
                second = %second,
                fragments = pair.len(),
                clusters = clusters.len(),
                "clustered translocation pair"
            );
        }
    }
    if clustered < pooled.len() {
        info!(
            pooled = pooled.len(),
            clustered,
            "translocations outside the configured chromosome pairs were left unclustered"
        );
    }

    writer::write_aggregated_stats(&config.stats_output_path(), &aggregated)?;
    info!(
        output = %config.stats_output_path().display(),
        "aggregation complete"
    );
    Ok(())
}

#[derive(Debug)]
struct PipelineProgress {
    progress_bar: Option<ProgressBar>,
    finished: bool,
}

impl PipelineProgress {
    fn new(enabled: bool, total: usize) -> Self {
        let progress_bar = if enabled {
            let bar = ProgressBar::new(total as u64);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template(
                "{spinner:.green} {elapsed_precise} [{bar:30}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar.set_message("clustering chromosomes");
            Some(bar)
        } else {
            None
        };
        Self {
            progress_bar,
            finished: false,
        }
    }

    fn on_chromosome_done(&self, chromosome: &str) {
        if let Some(bar) = &self.progress_bar {
            bar.inc(1);
            bar.set_message(format!("finished {chromosome}"));
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message("all chromosome workers joined");
        }
        self.finished = true;
    }
}

impl Drop for PipelineProgress {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(bar) = &self.progress_bar {
                bar.finish_and_clear();
            }
        }
    }
}
