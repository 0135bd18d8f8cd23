//! Drive the chosen route once among background traffic and summarise the trip.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use crate::config::ReplayConfig;
use crate::infra::traci::TraciValue;
use crate::infra::traci::constants::*;
use crate::infra::{SegmentId, SimError, TraciConnection};

pub const REPLAY_ROUTE_ID: &str = "best_route";
pub const REPLAY_VEHICLE_ID: &str = "replay_0";

const REPLAY_SUBSCRIPTION: [u8; 7] = [
    VAR_ROAD_ID,
    VAR_SPEED,
    VAR_WAITING_TIME,
    VAR_ACCUMULATED_WAITING_TIME,
    VAR_CO2EMISSION,
    VAR_FUELCONSUMPTION,
    VAR_DISTANCE,
];

/// State of the replay vehicle after one simulated second.
#[derive(Debug, Clone, PartialEq)]
pub struct TripSample {
    pub segment: SegmentId,
    /// m/s
    pub speed: f64,
    /// s
    pub waiting_time: f64,
    /// s
    pub accumulated_waiting_time: f64,
    /// mg/s
    pub co2_emission: f64,
    /// mg/s
    pub fuel_consumption: f64,
    /// Odometer in m
    pub distance: f64,
}

impl TripSample {
    /// `None` when the vehicle did not report its road this step or is still
    /// waiting for insertion.
    pub fn from_subscription(values: &HashMap<u8, TraciValue>) -> Option<Self> {
        let number = |variable: u8| values.get(&variable).and_then(TraciValue::as_f64).unwrap_or(0.0);
        let segment = values
            .get(&VAR_ROAD_ID)?
            .as_str()
            .filter(|road| !road.is_empty())?
            .to_string();
        Some(Self {
            segment,
            speed: number(VAR_SPEED),
            waiting_time: number(VAR_WAITING_TIME),
            accumulated_waiting_time: number(VAR_ACCUMULATED_WAITING_TIME),
            co2_emission: number(VAR_CO2EMISSION),
            fuel_consumption: number(VAR_FUELCONSUMPTION),
            distance: number(VAR_DISTANCE),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripStats {
    pub distance_km: f64,
    /// One sample per simulated second
    pub travel_time_secs: u64,
    pub preferred_distance_km: f64,
    pub waiting_time_secs: u64,
    pub average_speed_kmh: f64,
    /// g
    pub co2_total: f64,
}

impl TripStats {
    pub fn from_samples(samples: &[TripSample], preferred: &HashMap<SegmentId, f32>) -> Self {
        let distance = samples.last().map(|s| s.distance).unwrap_or(0.0);
        let waiting = samples.last().map(|s| s.accumulated_waiting_time).unwrap_or(0.0);
        let average_speed = if samples.is_empty() {
            0.0
        } else {
            samples.iter().fold(0.0, |sum, s| sum + s.speed) / samples.len() as f64
        };

        Self {
            distance_km: round2(distance / 1000.0),
            travel_time_secs: samples.len() as u64,
            preferred_distance_km: round2(preferred_distance(samples, preferred) / 1000.0),
            waiting_time_secs: waiting.max(0.0) as u64,
            average_speed_kmh: round2(average_speed * 3.6),
            co2_total: round2(samples.iter().fold(0.0, |sum, s| sum + s.co2_emission) / 1000.0),
        }
    }
}

impl fmt::Display for TripStats {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "distance {} km, travel time {} min, on preferred roads {} km, waiting {} min, avg speed {} km/h, CO2 {} g",
            self.distance_km,
            format_seconds(self.travel_time_secs),
            self.preferred_distance_km,
            format_seconds(self.waiting_time_secs),
            self.average_speed_kmh,
            self.co2_total
        )
    }
}

/// Metres driven on each preferred segment, taken from the odometer at the
/// first and last sample on it.
fn preferred_distance(samples: &[TripSample], preferred: &HashMap<SegmentId, f32>) -> f64 {
    preferred.keys().fold(0.0, |total, segment| {
        let mut on_segment = samples.iter().filter(|s| &s.segment == segment);
        match (on_segment.next(), on_segment.last()) {
            (Some(first), Some(last)) => total + last.distance - first.distance,
            _ => total,
        }
    })
}

pub fn format_seconds(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Rounds to two decimals; negative zero comes back as zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficVehicle {
    pub id: String,
    pub route_id: String,
    /// Absolute departure time in s
    pub depart: f64,
}

/// Background vehicles on random routes, departing within the window after
/// `now`.
pub fn plan_traffic<R: Rng>(config: &ReplayConfig, now: f64, rng: &mut R) -> Vec<TrafficVehicle> {
    if config.traffic_routes.is_empty() {
        return Vec::new();
    }
    (1..=config.traffic_vehicles)
        .filter_map(|i| {
            let route_id = config.traffic_routes.choose(rng)?.clone();
            let offset = rng.random_range(0..=config.depart_window);
            Some(TrafficVehicle {
                id: format!("traffic_{}", i),
                route_id,
                depart: (now + offset as f64).ceil(),
            })
        })
        .collect()
}

/// Insert the route and its vehicle, add background traffic and step until
/// the vehicle has arrived.
pub async fn replay_route<R: Rng>(
    connection: &mut TraciConnection,
    route: &[SegmentId],
    config: &ReplayConfig,
    preferred: &HashMap<SegmentId, f32>,
    rng: &mut R,
) -> Result<TripStats, SimError> {
    connection.add_route(REPLAY_ROUTE_ID, route).await?;
    connection
        .add_vehicle(REPLAY_VEHICLE_ID, REPLAY_ROUTE_ID, "now")
        .await?;
    connection
        .subscribe_vehicle(REPLAY_VEHICLE_ID, &REPLAY_SUBSCRIPTION)
        .await?;

    let now = connection.simulation_time().await?;
    let traffic = plan_traffic(config, now, rng);
    for vehicle in &traffic {
        connection
            .add_vehicle(&vehicle.id, &vehicle.route_id, &format!("{}", vehicle.depart))
            .await?;
    }
    info!(
        "Replaying {} segments with {} background vehicles",
        route.len(),
        traffic.len()
    );

    let mut samples: Vec<TripSample> = Vec::new();
    for _ in 0..config.max_ticks {
        connection.simulation_step().await?;
        match connection
            .subscription_results(REPLAY_VEHICLE_ID)
            .and_then(TripSample::from_subscription)
        {
            Some(sample) => samples.push(sample),
            None if !samples.is_empty() => break,
            None => {}
        }
    }

    if samples.is_empty() {
        warn!("{} never departed", REPLAY_VEHICLE_ID);
    } else if connection.subscription_results(REPLAY_VEHICLE_ID).is_some() {
        warn!(
            "{} still driving after {} ticks",
            REPLAY_VEHICLE_ID, config.max_ticks
        );
    }
    debug!("Collected {} trip samples", samples.len());

    let stats = TripStats::from_samples(&samples, preferred);
    info!("Replay finished: {}", stats);
    Ok(stats)
}
