use anyhow::{Context, Result};
use clap::Parser;
use crowd_common::{GeneratorConfig, LayoutKind, MotionAxis, PlacementStrategy, PrimaryPlacement};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

mod placement;

/// Generates a non-overlapping initial configuration and writes the static and
/// dynamic files the simulator reads.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML file with the base configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Arena width
    #[arg(short = 'W', long)]
    width: Option<f64>,

    /// Arena height
    #[arg(short = 'H', long)]
    height: Option<f64>,

    /// Band along the walls where no agent may be centered
    #[arg(long)]
    border_margin: Option<f64>,

    /// Number of background agents
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Background agent radius
    #[arg(long)]
    radius: Option<f64>,

    /// Background agent speed
    #[arg(long)]
    speed: Option<f64>,

    /// Mass written next to every radius
    #[arg(long)]
    mass: Option<f64>,

    /// Axis background agents move along (x, y)
    #[arg(long)]
    axis: Option<MotionAxis>,

    /// Primary agent radius
    #[arg(long)]
    primary_radius: Option<f64>,

    /// Comfort radius (also positions the primary in center-left mode)
    #[arg(long)]
    comfort_radius: Option<f64>,

    /// Where the primary starts (center-left, center)
    #[arg(long)]
    primary_placement: Option<PrimaryPlacement>,

    /// Wall safety distance written to the static header
    #[arg(long)]
    wall_distance: Option<f64>,

    /// Preferred speed written to the static header
    #[arg(long)]
    pref_speed: Option<f64>,

    /// Preferred relaxation time written to the static header
    #[arg(long)]
    pref_time: Option<f64>,

    /// Maximum speed written to the static header
    #[arg(long)]
    max_speed: Option<f64>,

    /// Anticipation time written as a fourth header value
    #[arg(long)]
    anticipation_time: Option<f64>,

    /// Static file layout (simple, extended)
    #[arg(long)]
    layout: Option<LayoutKind>,

    /// Background placement strategy (uniform, columns)
    #[arg(long)]
    strategy: Option<PlacementStrategy>,

    /// Candidate draws before giving up; 0 retries forever
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Seed for reproducible placement
    #[arg(long)]
    seed: Option<u64>,

    /// Output path for the static file
    #[arg(long)]
    static_file: Option<PathBuf>,

    /// Output path for the dynamic file
    #[arg(long)]
    dynamic_file: Option<PathBuf>,
}

impl Args {
    /// Applies every flag that was given on top of `config`.
    fn apply(self, config: &mut GeneratorConfig) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        set(&mut config.arena.width, self.width);
        set(&mut config.arena.height, self.height);
        set(&mut config.arena.border_margin, self.border_margin);
        set(&mut config.agents.count, self.count);
        set(&mut config.agents.radius, self.radius);
        set(&mut config.agents.speed, self.speed);
        if self.mass.is_some() {
            config.agents.mass = self.mass;
        }
        set(&mut config.agents.axis, self.axis);
        set(&mut config.primary.radius, self.primary_radius);
        set(&mut config.primary.comfort_radius, self.comfort_radius);
        set(&mut config.primary.placement, self.primary_placement);
        set(&mut config.simulation.wall_safety_distance, self.wall_distance);
        set(&mut config.simulation.pref_speed, self.pref_speed);
        set(&mut config.simulation.pref_time, self.pref_time);
        set(&mut config.simulation.max_speed, self.max_speed);
        if self.anticipation_time.is_some() {
            config.simulation.anticipation_time = self.anticipation_time;
        }
        set(&mut config.simulation.layout, self.layout);
        set(&mut config.placement.strategy, self.strategy);
        set(&mut config.placement.max_attempts, self.max_attempts);
        if self.seed.is_some() {
            config.placement.seed = self.seed;
        }
        set(&mut config.output.static_file, self.static_file);
        set(&mut config.output.dynamic_file, self.dynamic_file);
    }
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting crowd placement generator...");
    let args = Args::parse();

    // --- Load Configuration ---
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            GeneratorConfig::load(path)?
        }
        None => GeneratorConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid generator configuration")?;
    debug!("Generator configuration: {:#?}", config);

    info!(
        "Arena {} x {} (border {}), {} background agents of radius {}",
        config.arena.width, config.arena.height, config.arena.border_margin, config.agents.count, config.agents.radius
    );
    match config.placement.seed {
        Some(seed) => info!("Using placement seed {}", seed),
        None => info!("No seed given, drawing placement from OS entropy"),
    }

    // --- Place Agents ---
    let start_time = Instant::now();
    let mut rng = placement::placement_rng(&config);
    let generated = placement::generate(&config, &mut rng).context("Placement failed")?;
    info!(
        "Generated {} agents in {:.2?}",
        generated.agents.len(),
        start_time.elapsed()
    );

    // --- Write Interchange Files ---
    let static_path = &config.output.static_file;
    let dynamic_path = &config.output.dynamic_file;
    generated.save(static_path, dynamic_path).with_context(|| {
        format!(
            "Failed to write configuration to '{}' and '{}'",
            static_path.display(),
            dynamic_path.display()
        )
    })?;
    info!("Static configuration written to {}", static_path.display());
    info!("Dynamic configuration written to {}", dynamic_path.display());

    Ok(())
}
