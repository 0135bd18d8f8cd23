pub mod config;
pub mod infra;
pub mod planners;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigError, EnvConfig};
pub use infra::{RoadNetwork, SegmentId, SimError, Simulator, TraciConnection};
pub use planners::rl::{EnvError, RoutePlannerEnv, Transition};
