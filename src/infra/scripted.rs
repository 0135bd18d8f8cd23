//! In-memory simulator for environment tests.
//!
//! Vehicles depart on the first tick after being spawned, spend a fixed
//! number of ticks on each segment, cross a junction-internal segment for one
//! tick and then continue onto the segment set through `set_upcoming_route`.
//! A vehicle without an upcoming segment keeps driving on its current one.
//! Distances are the absolute difference of per-segment coordinates.
//!
//! With an insertion delay a spawned vehicle waits that many extra ticks
//! before departing. Like SUMO it then reports an empty road id and is
//! missing from the vehicle list, although it can still be removed.

use std::collections::HashMap;

use crate::infra::{SegmentId, SimError, Simulator};

#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Tick,
    SetRoute(String, Vec<SegmentId>),
    Spawn(String, String),
    Remove(String),
}

#[derive(Debug, Clone)]
enum Placement {
    Pending { wait: u32 },
    OnSegment { segment: SegmentId, ticks: u32 },
    Junction { next: SegmentId },
}

#[derive(Debug, Clone)]
struct Vehicle {
    placement: Placement,
    upcoming: Option<SegmentId>,
}

pub struct ScriptedSimulator {
    segments: Vec<SegmentId>,
    routes: HashMap<String, SegmentId>,
    coordinates: HashMap<SegmentId, f64>,
    ticks_per_segment: u32,
    insertion_delay: u32,
    vehicles: HashMap<String, Vehicle>,
    pub calls: Vec<SimCall>,
}

impl ScriptedSimulator {
    /// `segments` pairs each segment id with its coordinate. The base route
    /// `r_0` starts on `start`.
    pub fn new(segments: &[(&str, f64)], start: &str) -> Self {
        let mut all: Vec<SegmentId> = segments.iter().map(|(id, _)| id.to_string()).collect();
        all.push(":J_0".to_string());
        Self {
            segments: all,
            routes: HashMap::from([("r_0".to_string(), start.to_string())]),
            coordinates: segments.iter().map(|(id, x)| (id.to_string(), *x)).collect(),
            ticks_per_segment: 2,
            insertion_delay: 0,
            vehicles: HashMap::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_insertion_delay(mut self, ticks: u32) -> Self {
        self.insertion_delay = ticks;
        self
    }

    /// Take a vehicle out as if it had arrived on its own.
    pub fn finish_trip(&mut self, vehicle_id: &str) {
        self.vehicles.remove(vehicle_id);
    }

    pub fn tick_count(&self) -> usize {
        self.calls.iter().filter(|call| **call == SimCall::Tick).count()
    }

    pub fn live_vehicles(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vehicles.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Simulator for ScriptedSimulator {
    async fn segment_ids(&mut self) -> Result<Vec<SegmentId>, SimError> {
        Ok(self.segments.clone())
    }

    async fn advance_tick(&mut self) -> Result<(), SimError> {
        self.calls.push(SimCall::Tick);
        let ticks_per_segment = self.ticks_per_segment;
        for vehicle in self.vehicles.values_mut() {
            vehicle.placement = match std::mem::replace(&mut vehicle.placement, Placement::Pending { wait: 0 }) {
                Placement::Pending { wait } if wait > 0 => Placement::Pending { wait: wait - 1 },
                Placement::Pending { .. } => match vehicle.upcoming.take() {
                    Some(start) => Placement::OnSegment {
                        segment: start,
                        ticks: 0,
                    },
                    None => Placement::Pending { wait: 0 },
                },
                Placement::OnSegment { segment, ticks } => {
                    match vehicle.upcoming.take() {
                        Some(next) if ticks + 1 >= ticks_per_segment => Placement::Junction { next },
                        upcoming => {
                            vehicle.upcoming = upcoming;
                            Placement::OnSegment {
                                segment,
                                ticks: ticks + 1,
                            }
                        }
                    }
                }
                Placement::Junction { next } => Placement::OnSegment {
                    segment: next,
                    ticks: 0,
                },
            };
        }
        Ok(())
    }

    fn current_segment_of(&self, vehicle_id: &str) -> Option<SegmentId> {
        match &self.vehicles.get(vehicle_id)?.placement {
            Placement::Pending { .. } if self.insertion_delay > 0 => Some(String::new()),
            Placement::Pending { .. } => None,
            Placement::OnSegment { segment, .. } => Some(segment.clone()),
            Placement::Junction { .. } => Some(":J_0".to_string()),
        }
    }

    async fn set_upcoming_route(&mut self, vehicle_id: &str, route: &[SegmentId]) -> Result<(), SimError> {
        self.calls
            .push(SimCall::SetRoute(vehicle_id.to_string(), route.to_vec()));
        let vehicle = self.vehicles.get_mut(vehicle_id).ok_or_else(|| SimError::CommandFailed {
            command: 0xc4,
            message: format!("Vehicle '{}' is not known", vehicle_id),
        })?;
        vehicle.upcoming = route.get(1).cloned();
        Ok(())
    }

    async fn spawn_vehicle(&mut self, vehicle_id: &str, route_id: &str) -> Result<(), SimError> {
        self.calls
            .push(SimCall::Spawn(vehicle_id.to_string(), route_id.to_string()));
        let start = self.routes.get(route_id).cloned().ok_or_else(|| SimError::CommandFailed {
            command: 0xc4,
            message: format!("Invalid route '{}'", route_id),
        })?;
        // Departure happens on the next tick; keep the start segment queued.
        self.vehicles.insert(
            vehicle_id.to_string(),
            Vehicle {
                placement: Placement::Pending {
                    wait: self.insertion_delay,
                },
                upcoming: Some(start),
            },
        );
        Ok(())
    }

    async fn vehicle_exists(&mut self, vehicle_id: &str) -> Result<bool, SimError> {
        Ok(self
            .vehicles
            .get(vehicle_id)
            .is_some_and(|vehicle| !matches!(vehicle.placement, Placement::Pending { .. })))
    }

    async fn remove_vehicle(&mut self, vehicle_id: &str) -> Result<(), SimError> {
        self.calls.push(SimCall::Remove(vehicle_id.to_string()));
        match self.vehicles.remove(vehicle_id) {
            Some(_) => Ok(()),
            None => Err(SimError::CommandFailed {
                command: 0xc4,
                message: format!("Vehicle '{}' is not known", vehicle_id),
            }),
        }
    }

    async fn distance_between(&mut self, from: &str, to: &str) -> Result<f64, SimError> {
        let from = self.coordinates.get(from).copied().unwrap_or(0.0);
        let to = self.coordinates.get(to).copied().unwrap_or(0.0);
        Ok((from - to).abs())
    }
}
