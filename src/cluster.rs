use crate::errors::{AppError, Result};
use crate::fragment::{Direction, Fragment};
use petgraph::unionfind::UnionFind;
use std::collections::BTreeMap;

pub const MIN_CLUSTER_SUPPORT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    pub max_dist: f64,
    pub min_dist: f64,
    pub expected_direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub fragments: Vec<Fragment>,
    pub direction: Direction,
    pub orientation_mismatch: bool,
    pub low_confidence: bool,
}

impl Cluster {
    pub fn support(&self) -> usize {
        self.fragments.len()
    }

    pub fn begin_range(&self) -> (i64, i64) {
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for fragment in &self.fragments {
            let (begin, _) = fragment.breakpoints();
            lo = lo.min(begin);
            hi = hi.max(begin);
        }
        (lo, hi)
    }

    pub fn end_range(&self) -> (i64, i64) {
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for fragment in &self.fragments {
            let (_, end) = fragment.breakpoints();
            lo = lo.min(end);
            hi = hi.max(end);
        }
        (lo, hi)
    }
}

/// Groups fragments whose breakpoint pairs sit within `max_dist` of each
/// other, transitively. Two short intra-chromosomal fragments (both spans
/// under `min_dist`) must additionally agree within `min_dist` on both
/// breakpoints before they join. Every fragment lands in exactly one
/// cluster; cluster order follows the first member's position.
pub fn cluster_fragments(fragments: &[Fragment], params: &ClusterParams) -> Result<Vec<Cluster>> {
    if params.max_dist < params.min_dist {
        return Err(AppError::InvalidThresholds {
            max_dist: params.max_dist,
            min_dist: params.min_dist,
        });
    }
    if fragments.is_empty() {
        return Ok(Vec::new());
    }

    let mut order: Vec<usize> = (0..fragments.len()).collect();
    order.sort_by_key(|&index| {
        let (u, v) = fragments[index].breakpoints();
        (u, v, index)
    });

    let mut sets = UnionFind::<usize>::new(fragments.len());
    for (rank, &index) in order.iter().enumerate() {
        let (u, _) = fragments[index].breakpoints();
        for &other in order[..rank].iter().rev() {
            let (u_other, _) = fragments[other].breakpoints();
            // earlier fragments only get farther away on the sorted axis
            if (u - u_other) as f64 > params.max_dist {
                break;
            }
            if joinable(&fragments[index], &fragments[other], params) {
                sets.union(index, other);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..fragments.len() {
        groups.entry(sets.find(index)).or_default().push(index);
    }
    let mut members: Vec<Vec<usize>> = groups.into_values().collect();
    members.sort_by_key(|group| group[0]);

    let clusters = members
        .into_iter()
        .map(|group| {
            let fragments: Vec<Fragment> = group
                .iter()
                .map(|&index| fragments[index].clone())
                .collect();
            let direction = fragments[0].direction;
            Cluster {
                direction,
                orientation_mismatch: direction != params.expected_direction,
                low_confidence: fragments.len() < MIN_CLUSTER_SUPPORT,
                fragments,
            }
        })
        .collect();
    Ok(clusters)
}

fn joinable(a: &Fragment, b: &Fragment, params: &ClusterParams) -> bool {
    let (ua, va) = a.breakpoints();
    let (ub, vb) = b.breakpoints();
    let du = (ua - ub).abs() as f64;
    let dv = (va - vb).abs() as f64;
    if du > params.max_dist || dv > params.max_dist {
        return false;
    }
    let short_span = |fragment: &Fragment, u: i64, v: i64| {
        fragment.is_intra() && ((v - u) as f64) < params.min_dist
    };
    if short_span(a, ua, va) && short_span(b, ub, vb) {
        return du <= params.min_dist && dv <= params.min_dist;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{cluster_fragments, ClusterParams, MIN_CLUSTER_SUPPORT};
    use crate::errors::AppError;
    use crate::fragment::{Direction, Fragment};
    use std::collections::BTreeMap;

    fn params() -> ClusterParams {
        ClusterParams {
            max_dist: 240.0,
            min_dist: 100.0,
            expected_direction: Direction::Fr,
        }
    }

    fn intra(name: &str, begin: i64, length: i64, direction: Direction) -> Fragment {
        Fragment::new(
            name.to_string(),
            "1".to_string(),
            begin,
            "1".to_string(),
            begin + 60,
            direction,
            Some(length),
        )
    }

    fn trans(name: &str, first_begin: i64, second_begin: i64) -> Fragment {
        Fragment::new(
            name.to_string(),
            "1".to_string(),
            first_begin,
            "2".to_string(),
            second_begin,
            Direction::Ff,
            None,
        )
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusters = cluster_fragments(&[], &params()).expect("expected clustering success");
        assert!(clusters.is_empty());
    }

    #[test]
    fn singleton_is_low_confidence() {
        let fragments = vec![intra("a1", 10_000, 400, Direction::Rr)];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].low_confidence);
        assert_eq!(clusters[0].support(), 1);
        assert!(clusters[0].support() < MIN_CLUSTER_SUPPORT);
    }

    #[test]
    fn nearby_pair_forms_one_cluster() {
        let fragments = vec![
            intra("a1", 10_000, 400, Direction::Rr),
            intra("a2", 10_050, 400, Direction::Rr),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].support(), 2);
        assert!(!clusters[0].low_confidence);
        assert_eq!(clusters[0].begin_range(), (10_000, 10_050));
        assert_eq!(clusters[0].end_range(), (10_400, 10_450));
    }

    #[test]
    fn chain_joins_transitively() {
        // a-b and b-c are close, a-c is not; all three must still merge
        let fragments = vec![
            intra("a", 10_000, 400, Direction::Rr),
            intra("b", 10_200, 400, Direction::Rr),
            intra("c", 10_400, 400, Direction::Rr),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].support(), 3);
    }

    #[test]
    fn distant_fragments_stay_separate() {
        let fragments = vec![
            intra("a", 10_000, 400, Direction::Rr),
            intra("b", 50_000, 400, Direction::Rr),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters.len(), 2);
        assert!(clusters[0].low_confidence);
        assert!(clusters[1].low_confidence);
    }

    #[test]
    fn every_fragment_lands_in_exactly_one_cluster() {
        let mut fragments = Vec::new();
        for index in 0..40i64 {
            fragments.push(intra(
                &format!("f{index}"),
                (index % 7) * 4_000 + index * 13,
                350 + (index % 5) * 20,
                Direction::Rr,
            ));
        }
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");

        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for cluster in &clusters {
            for fragment in &cluster.fragments {
                *seen.entry(fragment.name.clone()).or_insert(0) += 1;
            }
        }
        assert_eq!(seen.len(), fragments.len());
        assert!(seen.values().all(|&count| count == 1));
    }

    #[test]
    fn rejects_max_dist_below_min_dist() {
        let fragments = vec![intra("a", 10_000, 400, Direction::Rr)];
        let bad = ClusterParams {
            max_dist: 50.0,
            min_dist: 100.0,
            expected_direction: Direction::Fr,
        };
        let error = cluster_fragments(&fragments, &bad).expect_err("expected threshold error");
        assert!(matches!(error, AppError::InvalidThresholds { .. }));
    }

    #[test]
    fn short_spans_need_tight_agreement() {
        let tight = ClusterParams {
            max_dist: 240.0,
            min_dist: 60.0,
            expected_direction: Direction::Fr,
        };
        // spans of 50 sit below min_dist, so breakpoints must agree within it
        let apart = vec![
            intra("a", 10_000, 50, Direction::Rr),
            intra("b", 10_080, 50, Direction::Rr),
        ];
        let clusters = cluster_fragments(&apart, &tight).expect("expected clustering success");
        assert_eq!(clusters.len(), 2);

        let close = vec![
            intra("a", 10_000, 50, Direction::Rr),
            intra("b", 10_030, 50, Direction::Rr),
        ];
        let clusters = cluster_fragments(&close, &tight).expect("expected clustering success");
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn orientation_mismatch_follows_expected_direction() {
        let fragments = vec![
            intra("a1", 10_000, 400, Direction::Rr),
            intra("a2", 10_050, 400, Direction::Rr),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert!(clusters[0].orientation_mismatch);

        let matching = ClusterParams {
            expected_direction: Direction::Rr,
            ..params()
        };
        let clusters =
            cluster_fragments(&fragments, &matching).expect("expected clustering success");
        assert!(!clusters[0].orientation_mismatch);
    }

    #[test]
    fn clustering_is_deterministic() {
        let mut fragments = Vec::new();
        for index in 0..30i64 {
            fragments.push(intra(
                &format!("f{index}"),
                (29 - index) * 180,
                400,
                Direction::Rr,
            ));
        }
        let first = cluster_fragments(&fragments, &params()).expect("expected clustering success");
        let second = cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(first, second);
    }

    #[test]
    fn clusters_follow_input_order_of_first_member() {
        let fragments = vec![
            intra("late", 50_000, 400, Direction::Rr),
            intra("early", 10_000, 400, Direction::Rr),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters[0].fragments[0].name, "late");
        assert_eq!(clusters[1].fragments[0].name, "early");
    }

    #[test]
    fn translocations_split_on_far_second_breakpoint() {
        let fragments = vec![
            trans("t1", 20_000, 30_000),
            trans("t2", 20_040, 30_010),
            trans("t3", 20_080, 90_000),
        ];
        let clusters =
            cluster_fragments(&fragments, &params()).expect("expected clustering success");
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].support(), 2);
        assert_eq!(clusters[1].fragments[0].name, "t3");
    }
}
