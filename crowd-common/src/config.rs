use crate::configuration::{Arena, ExtendedHeader, StaticHeader};
use crate::error::{CrowdError, Result as CrowdResult};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on the x-column pool of the `columns` strategy.
pub const MAX_COLUMNS: usize = 1 << 20;

// Arena geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ArenaConfig {
    pub width: f64,
    pub height: f64,
    pub border_margin: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig { width: 20.0, height: 20.0, border_margin: 1.0 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MotionAxis {
    X,
    Y,
}

// Background agents
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct AgentsConfig {
    pub count: usize,
    pub radius: f64,
    pub speed: f64,
    pub mass: Option<f64>,
    pub axis: MotionAxis,
    /// Extra gap demanded between two background agents. Defaults to the
    /// primary clearance; `0` asks for plain non-penetration.
    pub clearance: Option<f64>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        AgentsConfig {
            count: 10,
            radius: 0.25,
            speed: 1.0,
            mass: Some(70.0),
            axis: MotionAxis::Y,
            clearance: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryPlacement {
    /// One comfort radius from the left wall, at mid-height.
    CenterLeft,
    Center,
}

// The distinguished agent whose trajectory gets measured
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PrimaryConfig {
    pub radius: f64,
    pub comfort_radius: f64,
    pub placement: PrimaryPlacement,
    /// Extra gap demanded between the primary and any background agent.
    /// Defaults to the primary's diameter.
    pub clearance: Option<f64>,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        PrimaryConfig {
            radius: 0.25,
            comfort_radius: 0.5,
            placement: PrimaryPlacement::CenterLeft,
            clearance: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Simple,
    Extended,
}

// Values passed through to the simulator in the static file header
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SimulationHeaderConfig {
    pub layout: LayoutKind,
    pub wall_safety_distance: f64,
    pub pref_speed: f64,
    pub pref_time: f64,
    pub max_speed: f64,
    pub anticipation_time: Option<f64>,
}

impl Default for SimulationHeaderConfig {
    fn default() -> Self {
        SimulationHeaderConfig {
            layout: LayoutKind::Extended,
            wall_safety_distance: 0.2,
            pref_speed: 1.3,
            pref_time: 0.5,
            max_speed: 2.0,
            anticipation_time: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStrategy {
    /// Both coordinates drawn uniformly inside the interior.
    Uniform,
    /// x drawn from a shuffled pool of distinct columns, y drawn uniformly.
    Columns,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PlacementConfig {
    pub strategy: PlacementStrategy,
    /// Distance between neighbouring x columns. Defaults to the agent diameter.
    pub column_spacing: Option<f64>,
    /// Candidate draws allowed before giving up; `0` retries forever.
    pub max_attempts: u64,
    pub seed: Option<u64>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            strategy: PlacementStrategy::Uniform,
            column_spacing: None,
            max_attempts: 100_000,
            seed: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub static_file: PathBuf,
    pub dynamic_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            static_file: PathBuf::from("static.txt"),
            dynamic_file: PathBuf::from("dynamic.txt"),
        }
    }
}

/// Placement generator configuration, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub simulation: SimulationHeaderConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl GeneratorConfig {
    /// Loads the generator configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: GeneratorConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CrowdResult<()> {
        let arena = self.arena()?;
        let invalid = |msg: String| -> CrowdResult<()> { Err(CrowdError::InvalidConfig(msg)) };

        if !(self.agents.radius > 0.0) {
            return invalid(format!("agent radius must be positive, got {}", self.agents.radius));
        }
        if !(self.agents.speed >= 0.0) {
            return invalid(format!("agent speed must be non-negative, got {}", self.agents.speed));
        }
        if let Some(mass) = self.agents.mass {
            if !(mass > 0.0) {
                return invalid(format!("agent mass must be positive, got {}", mass));
            }
        }
        if !(self.primary.radius > 0.0) {
            return invalid(format!("primary radius must be positive, got {}", self.primary.radius));
        }
        if !(self.primary.comfort_radius >= 0.0) {
            return invalid(format!(
                "comfort radius must be non-negative, got {}",
                self.primary.comfort_radius
            ));
        }
        if !(self.primary_clearance() >= 0.0) {
            return invalid(format!(
                "primary clearance must be non-negative, got {}",
                self.primary_clearance()
            ));
        }
        if !(self.agent_clearance() >= 0.0) {
            return invalid(format!("agent clearance must be non-negative, got {}", self.agent_clearance()));
        }
        if let Some(spacing) = self.placement.column_spacing {
            if !(spacing > 0.0) {
                return invalid(format!("column spacing must be positive, got {}", spacing));
            }
        }
        if self.placement.strategy == PlacementStrategy::Columns {
            self.column_count(&arena)?;
        }
        let start = self.primary_position(&arena);
        if !arena.contains(start) {
            return invalid(format!(
                "primary start ({}, {}) lies outside the bordered interior",
                start.x, start.y
            ));
        }
        Ok(())
    }

    pub fn arena(&self) -> CrowdResult<Arena> {
        Arena::new(self.arena.width, self.arena.height, self.arena.border_margin)
    }

    pub fn primary_clearance(&self) -> f64 {
        self.primary.clearance.unwrap_or(2.0 * self.primary.radius)
    }

    /// Clearance between two background agents.
    pub fn agent_clearance(&self) -> f64 {
        self.agents.clearance.unwrap_or_else(|| self.primary_clearance())
    }

    pub fn column_spacing(&self) -> f64 {
        self.placement.column_spacing.unwrap_or(2.0 * self.agents.radius)
    }

    /// Number of x columns the interior holds at `column_spacing`.
    pub fn column_count(&self, arena: &Arena) -> CrowdResult<usize> {
        let (x_left, x_right) = arena.x_range();
        let spacing = self.column_spacing();
        let gaps = ((x_right - x_left) / spacing).floor();
        if !(gaps.is_finite() && gaps < MAX_COLUMNS as f64) {
            return Err(CrowdError::InvalidConfig(format!(
                "column spacing {} splits the interior into more than {} columns",
                spacing, MAX_COLUMNS
            )));
        }
        Ok(gaps as usize + 1)
    }

    /// `None` when placement may retry forever.
    pub fn attempt_budget(&self) -> Option<u64> {
        match self.placement.max_attempts {
            0 => None,
            n => Some(n),
        }
    }

    /// Fixed starting point of the primary agent.
    pub fn primary_position(&self, arena: &Arena) -> crate::Vec2 {
        match self.primary.placement {
            PrimaryPlacement::CenterLeft => crate::Vec2::new(
                arena.border_margin.max(self.primary.comfort_radius),
                arena.height / 2.0,
            ),
            PrimaryPlacement::Center => arena.center(),
        }
    }

    pub fn static_header(&self) -> StaticHeader {
        match self.simulation.layout {
            LayoutKind::Simple => StaticHeader::Simple,
            LayoutKind::Extended => StaticHeader::Extended(ExtendedHeader {
                comfort_radius: self.primary.comfort_radius,
                wall_safety_distance: self.simulation.wall_safety_distance,
                pref_speed: self.simulation.pref_speed,
                pref_time: self.simulation.pref_time,
                max_speed: self.simulation.max_speed,
                anticipation_time: self.simulation.anticipation_time,
            }),
        }
    }
}

// Command-line spellings for the enum-valued settings

impl FromStr for PlacementStrategy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(PlacementStrategy::Uniform),
            "columns" => Ok(PlacementStrategy::Columns),
            other => Err(format!("unknown placement strategy '{}' (uniform, columns)", other)),
        }
    }
}

impl FromStr for PrimaryPlacement {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "center_left" | "center-left" => Ok(PrimaryPlacement::CenterLeft),
            "center" => Ok(PrimaryPlacement::Center),
            other => Err(format!("unknown primary placement '{}' (center-left, center)", other)),
        }
    }
}

impl FromStr for MotionAxis {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "x" | "X" => Ok(MotionAxis::X),
            "y" | "Y" => Ok(MotionAxis::Y),
            other => Err(format!("unknown axis '{}' (x, y)", other)),
        }
    }
}

impl FromStr for LayoutKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "simple" => Ok(LayoutKind::Simple),
            "extended" => Ok(LayoutKind::Extended),
            other => Err(format!("unknown static layout '{}' (simple, extended)", other)),
        }
    }
}
