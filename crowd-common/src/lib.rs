pub mod config;
pub mod configuration;
pub mod error;
pub mod trajectory;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{GeneratorConfig, ArenaConfig, AgentsConfig, PrimaryConfig, SimulationHeaderConfig, PlacementConfig, OutputConfig, MotionAxis, PrimaryPlacement, PlacementStrategy, LayoutKind};
pub use configuration::{Agent, Arena, Body, Configuration, DynamicRecord, ExtendedHeader, PrimarySlot, StaticHeader, StaticRecord};
pub use error::{CrowdError, Result};
pub use trajectory::{AgentSeries, TraceLayout, Trajectory};
pub use vecmath::{Vec2, circles_overlap, distance};
