use std::error::Error;
use std::fmt;
use std::io;

use crate::infra::SegmentId;

#[derive(Debug)]
pub enum SimError {
    Io(io::Error),
    Protocol(String),
    CommandFailed { command: u8, message: String },
    Launch(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::Io(e) => write!(formatter, "Simulator connection failed: {}", e),
            SimError::Protocol(message) => write!(formatter, "TraCI protocol error: {}", message),
            SimError::CommandFailed { command, message } => {
                write!(formatter, "Command 0x{:02x} failed ({})", command, message)
            }
            SimError::Launch(message) => write!(formatter, "Could not start simulator: {}", message),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SimError {
    fn from(e: io::Error) -> Self {
        SimError::Io(e)
    }
}

/// Control surface of the traffic simulator as seen by the environment.
///
/// Calls are sequential; an error from any of them is a connection-level
/// failure and aborts the run.
#[allow(async_fn_in_trait)]
pub trait Simulator {
    /// All segment ids known to the simulation, in a stable order.
    async fn segment_ids(&mut self) -> Result<Vec<SegmentId>, SimError>;

    /// Advance the simulation by one tick.
    async fn advance_tick(&mut self) -> Result<(), SimError>;

    /// Segment the vehicle occupied at the last tick, or `None` when the
    /// vehicle reported nothing (not departed yet, or already removed).
    fn current_segment_of(&self, vehicle_id: &str) -> Option<SegmentId>;

    async fn set_upcoming_route(&mut self, vehicle_id: &str, route: &[SegmentId]) -> Result<(), SimError>;

    /// Insert a vehicle on the given route and start tracking its segment.
    async fn spawn_vehicle(&mut self, vehicle_id: &str, route_id: &str) -> Result<(), SimError>;

    async fn vehicle_exists(&mut self, vehicle_id: &str) -> Result<bool, SimError>;

    /// Stop tracking a vehicle and take it out of the simulation.
    async fn remove_vehicle(&mut self, vehicle_id: &str) -> Result<(), SimError>;

    async fn distance_between(&mut self, from: &str, to: &str) -> Result<f64, SimError>;
}
