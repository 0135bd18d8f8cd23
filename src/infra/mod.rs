mod road_network;
mod route_sink;
mod simulator;
pub mod traci;

#[cfg(test)]
pub(crate) mod scripted;

pub use road_network::{NetworkError, RoadGraph, RoadNetwork};
pub use route_sink::{CompositeSink, RouteCollector, RouteLogFile, RouteSink};
pub use simulator::{SimError, Simulator};
pub use traci::TraciConnection;

/// Identifier of a road segment (a SUMO edge id).
pub type SegmentId = String;

/// Reading used when the simulator reports no usable segment for a vehicle.
pub const INTERNAL_SEGMENT: &str = ":";

/// Junction-internal segments are never decision points.
pub fn is_internal(segment: &str) -> bool {
    segment.starts_with(':')
}
