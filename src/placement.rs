use crowd_common::{
    circles_overlap, Agent, Configuration, CrowdError, GeneratorConfig, MotionAxis, PlacementStrategy,
    PrimarySlot, Result, Vec2,
};
use log::{debug, info, trace, warn};
use rand::distr::{Bernoulli, Uniform};
use rand::prelude::*;
use rand::seq::SliceRandom;

/// Builds the placement RNG: seeded when the config pins a seed, OS entropy otherwise.
pub fn placement_rng(config: &GeneratorConfig) -> StdRng {
    match config.placement.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn rand_error(e: impl std::fmt::Display) -> CrowdError {
    CrowdError::InvalidConfig(format!("cannot build sampling distribution: {}", e))
}

/// y draws tried on one column before it is given up.
const COLUMN_Y_DRAWS: u32 = 16;

/// Shuffled pool of distinct x columns. A column stays current until an agent
/// is accepted on it or `COLUMN_Y_DRAWS` candidates on it were rejected.
struct ColumnPool {
    xs: Vec<f64>,
    current: Option<f64>,
    draws: u32,
}

impl ColumnPool {
    fn new(x_left: f64, x_right: f64, spacing: f64, count: usize, rng: &mut StdRng) -> Self {
        let mut xs: Vec<f64> = (0..count).map(|i| (x_left + i as f64 * spacing).min(x_right)).collect();
        xs.shuffle(rng);
        Self { xs, current: None, draws: 0 }
    }

    /// x of the next candidate; `None` once every column is spent.
    fn next_x(&mut self) -> Option<f64> {
        if self.current.is_none() {
            self.current = self.xs.pop();
            self.draws = 0;
        }
        self.draws += 1;
        self.current
    }

    fn reject(&mut self) {
        if self.draws >= COLUMN_Y_DRAWS {
            self.current = None;
        }
    }

    fn accept(&mut self) {
        self.current = None;
    }
}

/// Places the primary agent at its fixed start and then rejection-samples
/// `config.agents.count` background agents inside the bordered interior.
///
/// The primary agent is index 0 of the result. A candidate is accepted only
/// if it clears every accepted agent; the primary gets `primary_clearance`
/// of extra room, other agents `agent_clearance`.
pub fn generate(config: &GeneratorConfig, rng: &mut StdRng) -> Result<Configuration> {
    config.validate()?;
    let arena = config.arena()?;
    let requested = config.agents.count;
    let radius = config.agents.radius;
    let speed = config.agents.speed;
    let primary_clearance = config.primary_clearance();
    let agent_clearance = config.agent_clearance();
    let budget = config.attempt_budget();

    let (x_left, x_right) = arena.x_range();
    let (y_bottom, y_top) = arena.y_range();
    let dist_x = Uniform::new_inclusive(x_left, x_right).map_err(rand_error)?;
    let dist_y = Uniform::new_inclusive(y_bottom, y_top).map_err(rand_error)?;
    let direction = Bernoulli::new(0.5).map_err(rand_error)?;

    let mut columns = match config.placement.strategy {
        PlacementStrategy::Uniform => None,
        PlacementStrategy::Columns => {
            let spacing = config.column_spacing();
            let count = config.column_count(&arena)?;
            debug!("Column pool holds {} x values ({} apart)", count, spacing);
            Some(ColumnPool::new(x_left, x_right, spacing, count, rng))
        }
    };

    if budget.is_none() {
        warn!("Placement attempt budget disabled: an arena too small for {} agents will never finish.", requested);
    }

    let primary = Agent {
        radius: config.primary.radius,
        mass: config.agents.mass,
        position: config.primary_position(&arena),
        velocity: Vec2::zero(),
    };
    debug!("Primary agent at ({:.3}, {:.3})", primary.position.x, primary.position.y);

    let mut agents = Vec::with_capacity(requested + 1);
    agents.push(primary);

    let mut attempts: u64 = 0;
    let infeasible = |agents: &[Agent], attempts: u64| CrowdError::InfeasiblePlacement {
        requested,
        placed: agents.len() - 1,
        attempts,
    };

    while agents.len() <= requested {
        if budget.is_some_and(|max| attempts >= max) {
            return Err(infeasible(&agents, attempts));
        }

        let x = match columns.as_mut() {
            Some(pool) => match pool.next_x() {
                Some(x) => x,
                None => return Err(infeasible(&agents, attempts)),
            },
            None => rng.sample(&dist_x),
        };
        attempts += 1;
        let candidate = Vec2::new(x, rng.sample(&dist_y));

        let blocked = agents.iter().enumerate().any(|(idx, other)| {
            let clearance = if idx == 0 { primary_clearance } else { agent_clearance };
            circles_overlap(other.position, other.radius, candidate, radius, clearance)
        });
        if blocked {
            trace!("Rejected candidate ({:.3}, {:.3})", candidate.x, candidate.y);
            if let Some(pool) = columns.as_mut() {
                pool.reject();
            }
            continue;
        }
        if let Some(pool) = columns.as_mut() {
            pool.accept();
        }

        let sign = if rng.sample(&direction) { -1.0 } else { 1.0 };
        let velocity = match config.agents.axis {
            MotionAxis::X => Vec2::new(sign * speed, 0.0),
            MotionAxis::Y => Vec2::new(0.0, sign * speed),
        };
        agents.push(Agent {
            radius,
            mass: config.agents.mass,
            position: candidate,
            velocity,
        });
    }

    info!(
        "Placed {} background agents in {} attempts ({:.1}% accepted)",
        requested,
        attempts,
        if attempts > 0 { 100.0 * requested as f64 / attempts as f64 } else { 100.0 }
    );

    Ok(Configuration {
        width: arena.width,
        height: arena.height,
        header: config.static_header(),
        agents,
        primary: PrimarySlot::First,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_common::{ArenaConfig, PrimaryPlacement};
    use proptest::prelude::*;

    fn scenario_config() -> GeneratorConfig {
        let mut config = GeneratorConfig::default();
        config.arena = ArenaConfig { width: 100.0, height: 50.0, border_margin: 5.0 };
        config.agents.count = 3;
        config.agents.radius = 1.0;
        config.agents.speed = 1.5;
        config.primary.radius = 2.0;
        config.primary.comfort_radius = 0.5;
        config.placement.seed = Some(42);
        config
    }

    fn assert_valid(config: &GeneratorConfig, generated: &Configuration) {
        let arena = config.arena().unwrap();
        for (i, a) in generated.agents.iter().enumerate() {
            assert!(arena.contains(a.position), "agent {} at {:?} outside interior", i, a.position);
            for (j, b) in generated.agents.iter().enumerate().skip(i + 1) {
                let clearance = if i == 0 { config.primary_clearance() } else { config.agent_clearance() };
                assert!(
                    !circles_overlap(a.position, a.radius, b.position, b.radius, clearance),
                    "agents {} and {} overlap",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn scenario_places_four_non_overlapping_agents() {
        let config = scenario_config();
        let mut rng = placement_rng(&config);
        let generated = generate(&config, &mut rng).unwrap();

        assert_eq!(generated.agents.len(), 4);
        assert_valid(&config, &generated);

        let primary = generated.primary_agent().unwrap();
        assert_eq!(primary.radius, 2.0);
        assert_eq!(primary.position, Vec2::new(5.0, 25.0));
        assert_eq!(primary.velocity, Vec2::zero());

        for agent in &generated.agents[1..] {
            assert_eq!(agent.radius, 1.0);
            assert_eq!(agent.velocity.x, 0.0);
            assert_eq!(agent.velocity.y.abs(), 1.5);
        }
    }

    #[test]
    fn scenario_files_parse_back_to_the_same_agents() {
        let config = scenario_config();
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let st = dir.path().join("static.txt");
        let dy = dir.path().join("dynamic.txt");
        generated.save(&st, &dy).unwrap();

        let loaded = Configuration::load(&st, &dy, PrimarySlot::First).unwrap();
        assert_eq!(loaded.agents.len(), 4);
        for (a, b) in loaded.agents.iter().zip(&generated.agents) {
            assert!((a.radius - b.radius).abs() < 1e-12);
            assert_eq!(a.mass, b.mass);
            assert!(a.position.distance(b.position) < 1e-12);
            assert!(a.velocity.distance(b.velocity) < 1e-12);
        }
    }

    #[test]
    fn same_seed_same_configuration() {
        let config = scenario_config();
        let a = generate(&config, &mut placement_rng(&config)).unwrap();
        let b = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn velocities_follow_configured_axis() {
        let mut config = scenario_config();
        config.agents.axis = MotionAxis::X;
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        for agent in &generated.agents[1..] {
            assert_eq!(agent.velocity.y, 0.0);
            assert_eq!(agent.velocity.x.abs(), 1.5);
        }
    }

    #[test]
    fn center_placement_puts_primary_mid_arena() {
        let mut config = scenario_config();
        config.primary.placement = PrimaryPlacement::Center;
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_eq!(generated.agents[0].position, Vec2::new(50.0, 25.0));
        assert_valid(&config, &generated);
    }

    #[test]
    fn background_agents_keep_the_primary_clearance_by_default() {
        let mut config = GeneratorConfig::default();
        config.arena = ArenaConfig { width: 12.0, height: 12.0, border_margin: 1.0 };
        config.agents.count = 6;
        config.agents.radius = 0.5;
        config.primary.radius = 1.0;
        config.placement.seed = Some(3);
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_valid(&config, &generated);

        let background = &generated.agents[1..];
        for (i, a) in background.iter().enumerate() {
            for b in &background[i + 1..] {
                assert!(a.position.distance(b.position) > 0.5 + 0.5 + 2.0);
            }
        }
    }

    #[test]
    fn explicit_zero_clearance_only_forbids_penetration() {
        let mut config = scenario_config();
        config.agents.clearance = Some(0.0);
        assert_eq!(config.agent_clearance(), 0.0);
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_valid(&config, &generated);
    }

    #[test]
    fn column_strategy_uses_distinct_x_values() {
        let mut config = scenario_config();
        config.agents.count = 20;
        config.agents.clearance = Some(0.0);
        config.placement.strategy = PlacementStrategy::Columns;
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_valid(&config, &generated);

        let mut xs: Vec<f64> = generated.agents[1..].iter().map(|a| a.position.x).collect();
        xs.sort_by(|a, b| a.total_cmp(b));
        xs.dedup();
        assert_eq!(xs.len(), 20);
    }

    #[test]
    fn crowded_arena_is_infeasible() {
        let mut config = GeneratorConfig::default();
        config.arena = ArenaConfig { width: 10.0, height: 10.0, border_margin: 0.0 };
        config.agents.count = 50;
        config.agents.radius = 2.0;
        config.primary.comfort_radius = 1.0;
        config.placement.max_attempts = 2_000;
        config.placement.seed = Some(1);
        let err = generate(&config, &mut placement_rng(&config)).unwrap_err();
        match err {
            CrowdError::InfeasiblePlacement { requested, placed, attempts } => {
                assert_eq!(requested, 50);
                assert!(placed < 50);
                assert_eq!(attempts, 2_000);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn exhausted_column_pool_is_infeasible() {
        let mut config = scenario_config();
        config.agents.count = 500;
        config.placement.strategy = PlacementStrategy::Columns;
        let err = generate(&config, &mut placement_rng(&config)).unwrap_err();
        assert!(matches!(err, CrowdError::InfeasiblePlacement { requested: 500, .. }));
    }

    #[test]
    fn column_rejected_near_primary_is_retried_with_new_y() {
        // A single column sitting on the primary: only some y values clear it.
        let mut config = scenario_config();
        config.agents.count = 1;
        config.placement.strategy = PlacementStrategy::Columns;
        config.placement.column_spacing = Some(1000.0);
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_eq!(generated.agents[1].position.x, 5.0);
        assert_valid(&config, &generated);
    }

    #[test]
    fn tiny_radius_with_columns_fails_cleanly() {
        let mut config = scenario_config();
        config.agents.radius = 1e-30;
        config.placement.strategy = PlacementStrategy::Columns;
        let err = generate(&config, &mut placement_rng(&config)).unwrap_err();
        assert!(matches!(err, CrowdError::InvalidConfig(_)));

        config.agents.radius = 1e-6;
        let err = generate(&config, &mut placement_rng(&config)).unwrap_err();
        assert!(matches!(err, CrowdError::InvalidConfig(_)));
    }

    #[test]
    fn zero_background_agents_yields_only_primary() {
        let mut config = scenario_config();
        config.agents.count = 0;
        let generated = generate(&config, &mut placement_rng(&config)).unwrap();
        assert_eq!(generated.agents.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Roomy arenas and small crowds: every case must place all agents.
        #[test]
        fn generated_configurations_are_valid(
            width in 40.0f64..200.0,
            height in 40.0f64..200.0,
            margin in 0.0f64..2.0,
            count in 0usize..12,
            radius in 0.1f64..0.6,
            clearance in proptest::option::of(0.0f64..0.3),
            columns in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let mut config = GeneratorConfig::default();
            config.arena = ArenaConfig { width, height, border_margin: margin };
            config.agents.count = count;
            config.agents.radius = radius;
            config.agents.clearance = clearance;
            config.primary.radius = radius;
            config.primary.comfort_radius = radius;
            config.placement.max_attempts = 20_000;
            config.placement.seed = Some(seed);
            if columns {
                config.placement.strategy = PlacementStrategy::Columns;
            }

            match generate(&config, &mut placement_rng(&config)) {
                Ok(generated) => {
                    prop_assert_eq!(generated.agents.len(), count + 1);
                    assert_valid(&config, &generated);
                }
                Err(e) => prop_assert!(false, "placement failed: {:?}", e),
            }
        }
    }
}
