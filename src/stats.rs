use crate::fragment::{Direction, Fragment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NORMAL_TAIL_TRIM: f64 = 0.005;
pub const PARAMETRIC_MIN_ABNORMAL: u64 = 100;
pub const MAX_DIST_FACTOR: f64 = 1.2;
pub const DEFAULT_EXPECTED_DIRECTION: Direction = Direction::Fr;

/// Exponential tail model of abnormal start-position gaps plus the abnormal
/// fraction, fitted only when the chromosome carries enough abnormal
/// fragments to make the fit meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricFit {
    pub a: f64,
    pub b: f64,
    pub p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromosomeStats {
    pub num_all_abn: u64,
    pub smallest_normal: i64,
    pub biggest_normal: i64,
    pub median: f64,
    pub flag_direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parametric: Option<ParametricFit>,
}

impl ChromosomeStats {
    /// Maximum clustering distance derived from the normal population.
    pub fn max_dist(&self) -> f64 {
        MAX_DIST_FACTOR * self.biggest_normal as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub per_chr_stats: BTreeMap<String, ChromosomeStats>,
}

/// Normal-length window from the first pass over a chromosome's fragments:
/// the modal mate orientation and the tail-trimmed length range of the
/// intra-chromosomal fragments carrying it. `None` when the chromosome has
/// no intra-chromosomal fragments to model.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalWindow {
    pub flag_direction: Direction,
    pub smallest: i64,
    pub biggest: i64,
    pub median: f64,
}

pub fn derive_normal_window(fragments: &[Fragment]) -> Option<NormalWindow> {
    let mut direction_counts = [0u64; 4];
    for fragment in fragments {
        if fragment.is_intra() {
            direction_counts[fragment.direction as usize] += 1;
        }
    }

    let mut flag_direction = Direction::Ff;
    let mut best = 0u64;
    for direction in Direction::ALL {
        let count = direction_counts[direction as usize];
        if count > best {
            best = count;
            flag_direction = direction;
        }
    }
    if best == 0 {
        return None;
    }

    let mut lengths: Vec<i64> = fragments
        .iter()
        .filter(|fragment| fragment.is_intra() && fragment.direction == flag_direction)
        .filter_map(|fragment| fragment.length)
        .collect();
    if lengths.is_empty() {
        return None;
    }
    lengths.sort_unstable();

    let trim = (lengths.len() as f64 * NORMAL_TAIL_TRIM).floor() as usize;
    let window = &lengths[trim..lengths.len() - trim];
    Some(NormalWindow {
        flag_direction,
        smallest: window[0],
        biggest: window[window.len() - 1],
        median: median_of_sorted(window),
    })
}

/// Second pass: a fragment is normal exactly when it is intra-chromosomal,
/// carries the modal orientation and its length falls inside the window.
/// Without a window every fragment is abnormal.
pub fn classify(fragments: &mut [Fragment], window: Option<&NormalWindow>) {
    for fragment in fragments.iter_mut() {
        let normal = window.is_some_and(|window| {
            fragment.is_intra()
                && fragment.direction == window.flag_direction
                && fragment
                    .length
                    .is_some_and(|length| window.smallest <= length && length <= window.biggest)
        });
        fragment.is_abnormal = !normal;
    }
}

pub fn build_stats(fragments: &[Fragment], window: Option<&NormalWindow>) -> ChromosomeStats {
    let num_all_abn = fragments
        .iter()
        .filter(|fragment| fragment.is_abnormal)
        .count() as u64;
    let parametric = fit_parametric(fragments, num_all_abn);
    match window {
        Some(window) => ChromosomeStats {
            num_all_abn,
            smallest_normal: window.smallest,
            biggest_normal: window.biggest,
            median: window.median,
            flag_direction: window.flag_direction,
            parametric,
        },
        None => ChromosomeStats {
            num_all_abn,
            smallest_normal: 0,
            biggest_normal: 0,
            median: 0.0,
            flag_direction: DEFAULT_EXPECTED_DIRECTION,
            parametric,
        },
    }
}

fn median_of_sorted(sorted: &[i64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    }
}

/// Least-squares fit of log-survival over the sorted gaps between abnormal
/// start positions. Fewer than two distinct gaps leave the slope undefined.
fn fit_parametric(fragments: &[Fragment], num_all_abn: u64) -> Option<ParametricFit> {
    if num_all_abn < PARAMETRIC_MIN_ABNORMAL || fragments.is_empty() {
        return None;
    }
    let p = num_all_abn as f64 / fragments.len() as f64;

    let mut begins: Vec<i64> = fragments
        .iter()
        .filter(|fragment| fragment.is_abnormal)
        .map(Fragment::begin)
        .collect();
    begins.sort_unstable();
    let mut gaps: Vec<f64> = begins
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect();
    gaps.sort_by(f64::total_cmp);
    if gaps.len() < 2 || !gaps.windows(2).any(|pair| pair[0] != pair[1]) {
        return None;
    }

    let count = gaps.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (index, gap) in gaps.iter().copied().enumerate() {
        let survival = (count - index as f64) / count;
        let y = survival.ln();
        sum_x += gap;
        sum_y += y;
        sum_xx += gap * gap;
        sum_xy += gap * y;
    }
    let denom = count * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let a = (count * sum_xy - sum_x * sum_y) / denom;
    let b = (sum_y - a * sum_x) / count;
    Some(ParametricFit { a, b, p })
}
