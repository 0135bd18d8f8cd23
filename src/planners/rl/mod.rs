//! Reinforcement learning over the simulated road network
//!
//! ```text
//! Simulator (TraCI)          RoadNetwork
//!     │                          │
//!     ▼                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RoutePlannerEnv                                            │
//! │  - reset() -> start segment index                           │
//! │  - step(action) -> (segment index, reward, done, info)      │
//! │  - reports successful routes to a RouteSink                 │
//! └─────────────────────────────────────────────────────────────┘
//!     ▲
//!     │ actions
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Trainer                                                    │
//! │  - RandomExplorer: uniform actions                          │
//! │  - PPOTrainer (feature `rl`): Burn actor-critic + PPO       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod env;
pub mod explore;
pub mod metrics;
pub mod trainer;

#[cfg(feature = "rl")]
pub mod policy;
#[cfg(feature = "rl")]
pub mod train;

pub use env::{ACTION_COUNT, EnvError, RoutePlannerEnv, StepInfo, Transition};
pub use explore::RandomExplorer;
pub use metrics::{EpisodeTracker, EpochResult, MovingAverage};
pub use trainer::{Trainer, train};

#[cfg(feature = "rl")]
pub use policy::{PolicyConfig, RolloutBuffer, RoutePolicy};
#[cfg(feature = "rl")]
pub use train::{PPOTrainer, TrainConfig};
