use crate::metrics::{MetricKind, RunMetrics};
use crowd_common::{CrowdError, Result};
use serde::Serialize;

/// All runs recorded under one heuristic parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub heuristic_param: f64,
    pub runs: Vec<RunMetrics>,
}

impl MetricGroup {
    pub fn values(&self, kind: MetricKind) -> Vec<f64> {
        self.runs.iter().map(|r| r.value(kind)).collect()
    }

    pub fn stat(&self, kind: MetricKind) -> AggregatedStat {
        let values = self.values(kind);
        AggregatedStat {
            heuristic_param: self.heuristic_param,
            mean: mean(&values),
            stdev: sample_stdev(&values),
        }
    }
}

/// Mean and spread of one metric for one heuristic parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatedStat {
    pub heuristic_param: f64,
    pub mean: f64,
    pub stdev: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two samples.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Groups runs by exact parameter equality, ascending by parameter.
/// Runs keep their store order inside a group.
pub fn group_runs(runs: &[RunMetrics]) -> Vec<MetricGroup> {
    let mut groups: Vec<MetricGroup> = Vec::new();
    for run in runs {
        match groups.iter_mut().find(|g| g.heuristic_param == run.heuristic_param) {
            Some(group) => group.runs.push(*run),
            None => groups.push(MetricGroup {
                // Adding 0.0 turns -0.0 into 0.0
                heuristic_param: run.heuristic_param + 0.0,
                runs: vec![*run],
            }),
        }
    }
    groups.sort_by(|a, b| a.heuristic_param.total_cmp(&b.heuristic_param));
    groups
}

/// Mean and stdev of `kind` per parameter value, ascending by parameter.
pub fn aggregate(runs: &[RunMetrics], kind: MetricKind) -> Vec<AggregatedStat> {
    group_runs(runs).iter().map(|g| g.stat(kind)).collect()
}

/// The group recorded under exactly `param`.
pub fn group_for(runs: &[RunMetrics], param: f64) -> Result<MetricGroup> {
    let selected: Vec<RunMetrics> = runs.iter().filter(|r| r.heuristic_param == param).copied().collect();
    if selected.is_empty() {
        return Err(CrowdError::EmptyMetricGroup { param });
    }
    Ok(MetricGroup { heuristic_param: param, runs: selected })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(param: f64, t: f64) -> RunMetrics {
        RunMetrics {
            heuristic_param: param,
            elapsed_time: t,
            distance_travelled: t * 2.0,
            mean_speed: 2.0,
            collision_count: t as u32,
        }
    }

    #[test]
    fn singleton_group_has_zero_stdev() {
        let stats = aggregate(&[run(0.5, 7.0)], MetricKind::ElapsedTime);
        assert_eq!(stats, vec![AggregatedStat { heuristic_param: 0.5, mean: 7.0, stdev: 0.0 }]);
    }

    #[test]
    fn one_two_three() {
        let runs = [run(1.0, 1.0), run(1.0, 2.0), run(1.0, 3.0)];
        let stats = aggregate(&runs, MetricKind::ElapsedTime);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].mean, 2.0);
        assert!((stats[0].stdev - 1.0).abs() < 1e-12);
    }

    #[test]
    fn groups_sorted_by_parameter() {
        let runs = [run(3.0, 1.0), run(1.0, 2.0), run(2.0, 5.0), run(1.0, 4.0), run(-0.0, 1.0), run(0.0, 3.0)];
        let groups = group_runs(&runs);
        let params: Vec<f64> = groups.iter().map(|g| g.heuristic_param).collect();
        assert_eq!(params, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(groups[1].values(MetricKind::ElapsedTime), vec![2.0, 4.0]);
        assert_eq!(groups[0].runs.len(), 2);

        let stats = aggregate(&runs, MetricKind::Collisions);
        assert_eq!(stats[1].mean, 3.0);
        assert!((stats[1].stdev - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_store_aggregates_to_nothing() {
        assert!(aggregate(&[], MetricKind::Distance).is_empty());
    }

    #[test]
    fn absent_parameter_is_an_empty_group() {
        let runs = [run(1.0, 1.0)];
        let err = group_for(&runs, 2.0).unwrap_err();
        assert!(matches!(err, CrowdError::EmptyMetricGroup { param } if param == 2.0));
        assert_eq!(group_for(&runs, 1.0).unwrap().runs.len(), 1);
    }

    #[test]
    fn sample_stdev_uses_n_minus_one() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((sample_stdev(&values) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(sample_stdev(&[]), 0.0);
    }
}
