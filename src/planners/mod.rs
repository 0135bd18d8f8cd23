pub mod replay;
pub mod rl;
pub mod selection;

pub use replay::{TripStats, replay_route};
pub use selection::{BestRoute, select_best_route};
