use std::collections::HashSet;

use crate::infra::SegmentId;

/// Progress of the controlled vehicle through one trial.
///
/// A fresh `Episode` is created every time a vehicle is spawned, so nothing
/// carries over between trials.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub vehicle_id: String,
    /// Segments chosen so far, starting with the start segment.
    pub route: Vec<SegmentId>,
    /// Segments the vehicle has departed from.
    pub visited: HashSet<SegmentId>,
    /// Index of the next goal to reach.
    pub goal_index: usize,
    /// Distance to the current goal recorded at the end of the last step.
    pub prev_distance: f64,
}

impl Episode {
    pub fn new(vehicle_id: String, start: SegmentId, initial_distance: f64) -> Self {
        Self {
            vehicle_id,
            route: vec![start],
            visited: HashSet::new(),
            goal_index: 0,
            prev_distance: initial_distance,
        }
    }

    pub fn extend_route(&mut self, segment: SegmentId) {
        self.route.push(segment);
    }

    pub fn mark_departed(&mut self, segment: SegmentId) {
        self.visited.insert(segment);
    }

    pub fn has_visited(&self, segment: &str) -> bool {
        self.visited.contains(segment)
    }

    pub fn advance_goal(&mut self) {
        self.goal_index += 1;
    }

    /// Goal currently being driven to. Past the last goal this stays on the
    /// last one.
    pub fn current_goal<'a>(&self, goals: &'a [SegmentId]) -> Option<&'a SegmentId> {
        goals.get(self.goal_index).or_else(|| goals.last())
    }

    pub fn is_on_last_goal(&self, goals: &[SegmentId]) -> bool {
        !goals.is_empty() && self.goal_index == goals.len() - 1
    }
}
