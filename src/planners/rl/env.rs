//! RL environment - gym-like interface over a running traffic simulation

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use tracing::{debug, info};

use crate::config::EnvConfig;
use crate::infra::{INTERNAL_SEGMENT, RoadGraph, RouteSink, SegmentId, SimError, Simulator, is_internal};
use crate::state::Episode;

/// Size of the discrete action space. Segments with more successors than
/// this cannot have all of them chosen.
pub const ACTION_COUNT: usize = 3;

pub const SUCCESS_REWARD: f32 = 10.0;
pub const FAILURE_REWARD: f32 = -10.0;
pub const GOAL_REWARD: f32 = 10.0;
pub const REVISIT_PENALTY: f32 = -10.0;
pub const PROGRESS_REWARD: f32 = 1.0;
pub const NO_PROGRESS_PENALTY: f32 = -1.0;

#[derive(Debug)]
pub enum EnvError {
    Simulator(SimError),
    /// A segment is missing from the enumeration taken at construction.
    UnknownSegment(SegmentId),
    NoGoals,
}

impl fmt::Display for EnvError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnvError::Simulator(e) => write!(formatter, "{}", e),
            EnvError::UnknownSegment(segment) => write!(formatter, "Unknown segment '{}'", segment),
            EnvError::NoGoals => write!(formatter, "At least one goal segment is required"),
        }
    }
}

impl Error for EnvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnvError::Simulator(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SimError> for EnvError {
    fn from(e: SimError) -> Self {
        EnvError::Simulator(e)
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Simulation ticks advanced during the step
    pub ticks: usize,
}

/// Step result from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Index of the resulting segment in the construction-time enumeration
    pub observation: usize,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// Drives one controlled vehicle through the simulation, one decision point
/// per step.
pub struct RoutePlannerEnv<S, G, K> {
    sim: S,
    graph: G,
    sink: K,
    config: EnvConfig,
    /// Segment enumeration fixed at construction
    segments: Vec<SegmentId>,
    segment_index: HashMap<SegmentId, usize>,
    start_index: usize,
    episode: Episode,
    /// Number of controlled vehicles spawned so far
    vehicles_spawned: usize,
    /// Set by `reset`: the next step ticks before its first reading
    first_tick_pending: bool,
}

impl<S, G, K> RoutePlannerEnv<S, G, K>
where
    S: Simulator,
    G: RoadGraph,
    K: RouteSink,
{
    /// Enumerate the segments and spawn the first controlled vehicle.
    pub async fn new(mut sim: S, graph: G, sink: K, config: EnvConfig) -> Result<Self, EnvError> {
        if config.goal_segments.is_empty() {
            return Err(EnvError::NoGoals);
        }

        let segments = sim.segment_ids().await?;
        let mut segment_index = HashMap::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            segment_index.entry(segment.clone()).or_insert(index);
        }
        let start_index = *segment_index
            .get(&config.start_segment)
            .ok_or_else(|| EnvError::UnknownSegment(config.start_segment.clone()))?;

        let episode = start_episode(&mut sim, &config, vehicle_id(0)).await?;
        info!(
            "Environment ready: {} segments, start {}, goals {:?}",
            segments.len(),
            config.start_segment,
            config.goal_segments
        );

        Ok(Self {
            sim,
            graph,
            sink,
            config,
            segments,
            segment_index,
            start_index,
            episode,
            vehicles_spawned: 1,
            first_tick_pending: true,
        })
    }

    /// Does not touch the simulation: the vehicle keeps its state and the
    /// next step starts with a tick.
    pub fn reset(&mut self) -> usize {
        self.first_tick_pending = true;
        self.start_index
    }

    /// Apply `action` at the current decision point and run the simulation
    /// until the vehicle reaches the next real segment or the episode ends.
    pub async fn step(&mut self, action: usize) -> Result<Transition, EnvError> {
        let mut departed: Option<SegmentId> = None;
        let mut action_applied = false;
        let mut reward: Option<f32> = None;
        let mut done = false;
        let mut readings = 0usize;
        let mut ticks = 0usize;

        let current = loop {
            let mut current = INTERNAL_SEGMENT.to_string();
            while is_internal(&current) {
                if readings > 0 || self.first_tick_pending {
                    self.sim.advance_tick().await?;
                    self.first_tick_pending = false;
                    ticks += 1;
                }
                readings += 1;
                current = self
                    .sim
                    .current_segment_of(&self.episode.vehicle_id)
                    .filter(|segment| !segment.is_empty())
                    .unwrap_or_else(|| INTERNAL_SEGMENT.to_string());
            }

            if self.is_terminal(&current) {
                done = true;
                if self.is_final_goal(&current) {
                    reward = Some(SUCCESS_REWARD);
                    info!(
                        "{} reached {} via {} segments",
                        self.episode.vehicle_id,
                        current,
                        self.episode.route.len()
                    );
                    self.sink.on_optimal_route_found(&self.episode.route);
                } else {
                    debug!("{} turned back onto {}", self.episode.vehicle_id, current);
                }
                self.respawn().await?;
                break current;
            }

            let previous = departed.get_or_insert_with(|| current.clone());
            if current != *previous {
                self.episode.mark_departed(previous.clone());
                break current;
            }

            if !action_applied {
                if self.commit_action(&current, action).await? {
                    action_applied = true;
                } else {
                    reward = Some(FAILURE_REWARD);
                    done = true;
                    self.respawn().await?;
                    break current;
                }
            }
        };

        let goal = self
            .episode
            .current_goal(&self.config.goal_segments)
            .cloned()
            .ok_or(EnvError::NoGoals)?;
        let distance = self.sim.distance_between(&current, &goal).await?;
        let reward = match reward {
            Some(reward) => reward,
            None => self.default_reward(&current, distance),
        };
        self.episode.prev_distance = distance;

        let observation = self.observation_of(&current)?;
        Ok(Transition {
            observation,
            reward,
            done,
            info: StepInfo { ticks },
        })
    }

    /// Extend the route with the chosen successor. Returns `false` for a
    /// dead end or an action past the successor list.
    async fn commit_action(&mut self, current: &str, action: usize) -> Result<bool, EnvError> {
        let outgoing = self.graph.outgoing_segments(current);
        let Some(next) = outgoing.get(action).cloned() else {
            if outgoing.is_empty() {
                debug!("{} hit a dead end on {}", self.episode.vehicle_id, current);
            } else {
                debug!(
                    "{} chose action {} on {} with {} successors",
                    self.episode.vehicle_id,
                    action,
                    current,
                    outgoing.len()
                );
            }
            return Ok(false);
        };

        let upcoming = [current.to_string(), next.clone()];
        self.sim
            .set_upcoming_route(&self.episode.vehicle_id, &upcoming)
            .await?;
        self.episode.extend_route(next);
        Ok(true)
    }

    /// Reward when the step ended without a success or failure reward.
    /// Rules apply in order: revisit, goal reached, progress, no progress.
    fn default_reward(&mut self, current: &str, distance: f64) -> f32 {
        if self.episode.has_visited(current) {
            return REVISIT_PENALTY;
        }
        if self.episode.current_goal(&self.config.goal_segments).map(String::as_str) == Some(current) {
            self.episode.advance_goal();
            return GOAL_REWARD;
        }
        if distance < self.episode.prev_distance {
            return self
                .config
                .preferred_segments
                .get(current)
                .copied()
                .unwrap_or(PROGRESS_REWARD);
        }
        NO_PROGRESS_PENALTY
    }

    fn is_final_goal(&self, segment: &str) -> bool {
        self.config.goal_segments.last().map(String::as_str) == Some(segment)
    }

    fn is_terminal(&self, segment: &str) -> bool {
        let on_last_goal = self.episode.is_on_last_goal(&self.config.goal_segments) && self.is_final_goal(segment);
        let turned_back = self.config.reverse_start_segment.as_deref() == Some(segment);
        on_last_goal || turned_back
    }

    fn observation_of(&self, segment: &str) -> Result<usize, EnvError> {
        self.segment_index
            .get(segment)
            .copied()
            .ok_or_else(|| EnvError::UnknownSegment(segment.to_string()))
    }

    /// Replace the controlled vehicle with a fresh one on the base route.
    async fn respawn(&mut self) -> Result<(), EnvError> {
        self.remove_current_vehicle().await?;
        let next_id = vehicle_id(self.vehicles_spawned);
        self.vehicles_spawned += 1;
        self.episode = start_episode(&mut self.sim, &self.config, next_id).await?;
        debug!("Spawned {}", self.episode.vehicle_id);
        Ok(())
    }

    /// A vehicle still waiting for insertion is removed too. A failed removal
    /// is only an error while the simulator still knows the vehicle.
    async fn remove_current_vehicle(&mut self) -> Result<(), EnvError> {
        let vehicle_id = &self.episode.vehicle_id;
        match self.sim.remove_vehicle(vehicle_id).await {
            Ok(()) => Ok(()),
            Err(SimError::CommandFailed { command, message }) => {
                if self.sim.vehicle_exists(vehicle_id).await? {
                    return Err(SimError::CommandFailed { command, message }.into());
                }
                debug!("{} already left the simulation ({})", vehicle_id, message);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the controlled vehicle and hand the simulator back.
    pub async fn shutdown(mut self) -> Result<S, EnvError> {
        self.remove_current_vehicle().await?;
        info!("Environment closed after {} vehicles", self.vehicles_spawned);
        Ok(self.sim)
    }

    pub fn observation_size(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn simulator(&self) -> &S {
        &self.sim
    }
}

fn vehicle_id(index: usize) -> String {
    format!("EGO_{}", index)
}

async fn start_episode<S: Simulator>(
    sim: &mut S,
    config: &EnvConfig,
    vehicle_id: String,
) -> Result<Episode, EnvError> {
    sim.spawn_vehicle(&vehicle_id, &config.base_route).await?;
    let first_goal = config.goal_segments.first().ok_or(EnvError::NoGoals)?;
    let distance = sim.distance_between(&config.start_segment, first_goal).await?;
    Ok(Episode::new(vehicle_id, config.start_segment.clone(), distance))
}
