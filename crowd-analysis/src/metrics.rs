use crowd_common::{circles_overlap, CrowdError, Result, Trajectory, Vec2};
use log::debug;
use serde::{Deserialize, Serialize};

/// The four quantities recorded per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize)]
pub enum MetricKind {
    /// Elapsed time (`t`)
    #[value(name = "t")]
    ElapsedTime,
    /// Distance travelled (`d`)
    #[value(name = "d")]
    Distance,
    /// Mean speed (`v`)
    #[value(name = "v")]
    MeanSpeed,
    /// Collision count (`c`)
    #[value(name = "c")]
    Collisions,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::ElapsedTime,
        MetricKind::Distance,
        MetricKind::MeanSpeed,
        MetricKind::Collisions,
    ];

    /// Key used in the results store.
    pub fn key(self) -> &'static str {
        match self {
            MetricKind::ElapsedTime => "t",
            MetricKind::Distance => "d",
            MetricKind::MeanSpeed => "v",
            MetricKind::Collisions => "c",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        MetricKind::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricKind::ElapsedTime => "Elapsed time",
            MetricKind::Distance => "Distance travelled",
            MetricKind::MeanSpeed => "Mean speed",
            MetricKind::Collisions => "Collisions",
        }
    }

    pub fn unit(self) -> Option<&'static str> {
        match self {
            MetricKind::ElapsedTime => Some("s"),
            MetricKind::Distance => Some("m"),
            MetricKind::MeanSpeed => Some("m/s"),
            MetricKind::Collisions => None,
        }
    }

    /// Axis caption, e.g. `Mean speed [m/s]`.
    pub fn axis_label(self) -> String {
        match self.unit() {
            Some(unit) => format!("{} [{}]", self.label(), unit),
            None => self.label().to_string(),
        }
    }
}

/// Metrics of a single simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub heuristic_param: f64,
    pub elapsed_time: f64,
    pub distance_travelled: f64,
    pub mean_speed: f64,
    pub collision_count: u32,
}

impl RunMetrics {
    /// Measures the primary agent of `trajectory`. `radii` lists every agent's
    /// radius in trace order.
    pub fn compute(trajectory: &Trajectory, radii: &[f64], heuristic_param: f64) -> Result<Self> {
        let primary = trajectory.primary_series();
        let elapsed_time = elapsed_time(&trajectory.times);
        let distance_travelled = distance_travelled(&primary.positions);
        let collision_count = collision_count(trajectory, radii)?;
        debug!(
            "Instantaneous mean speed of the primary agent: {:.4}",
            instantaneous_mean_speed(&primary.velocities)
        );
        Ok(Self {
            heuristic_param,
            elapsed_time,
            distance_travelled,
            mean_speed: mean_speed(elapsed_time, distance_travelled),
            collision_count,
        })
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::ElapsedTime => self.elapsed_time,
            MetricKind::Distance => self.distance_travelled,
            MetricKind::MeanSpeed => self.mean_speed,
            MetricKind::Collisions => self.collision_count as f64,
        }
    }
}

/// Time of the last recorded snapshot.
pub fn elapsed_time(times: &[f64]) -> f64 {
    times.last().copied().unwrap_or(0.0)
}

/// Running path length, starting at 0 and aligned with the samples.
pub fn cumulative_distance(positions: &[Vec2]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(positions.len());
    if !positions.is_empty() {
        out.push(0.0);
    }
    for step in positions.windows(2) {
        total += step[0].distance(step[1]);
        out.push(total);
    }
    out
}

/// Total path length.
pub fn distance_travelled(positions: &[Vec2]) -> f64 {
    positions.windows(2).map(|step| step[0].distance(step[1])).sum()
}

/// Whole-run average speed. A run that never advanced in time has speed 0.
pub fn mean_speed(elapsed_time: f64, distance_travelled: f64) -> f64 {
    if elapsed_time > 0.0 {
        distance_travelled / elapsed_time
    } else {
        0.0
    }
}

/// Mean magnitude of the sampled velocities.
pub fn instantaneous_mean_speed(velocities: &[Vec2]) -> f64 {
    if velocities.is_empty() {
        return 0.0;
    }
    velocities.iter().map(Vec2::length).sum::<f64>() / velocities.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContactState {
    Clear,
    Contacting,
}

/// Counts contact episodes between the primary agent and every other agent.
///
/// Each other agent starts `Clear`; the count only grows on a
/// `Clear -> Contacting` transition, so an unbroken run of overlapping steps
/// is a single collision.
pub fn collision_count(trajectory: &Trajectory, radii: &[f64]) -> Result<u32> {
    let agent_count = trajectory.agent_count();
    if radii.len() != agent_count {
        return Err(CrowdError::MissingAgentData {
            time: trajectory.times.first().copied().unwrap_or(0.0),
            expected: agent_count,
            found: radii.len(),
        });
    }

    let primary = trajectory.primary;
    let primary_positions = &trajectory.agents[primary].positions;
    let primary_radius = radii[primary];
    let mut states = vec![ContactState::Clear; agent_count];
    let mut count = 0;

    for (step, &primary_pos) in primary_positions.iter().enumerate() {
        for (other, series) in trajectory.agents.iter().enumerate() {
            if other == primary {
                continue;
            }
            let touching = circles_overlap(primary_pos, primary_radius, series.positions[step], radii[other], 0.0);
            states[other] = match (states[other], touching) {
                (ContactState::Clear, true) => {
                    count += 1;
                    debug!("Collision with agent {} at t = {}", other, trajectory.times[step]);
                    ContactState::Contacting
                }
                (_, true) => ContactState::Contacting,
                (_, false) => ContactState::Clear,
            };
        }
    }
    Ok(count)
}
