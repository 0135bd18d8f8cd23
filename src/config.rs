//! Runtime configuration read from environment variables (a `.env` file is
//! loaded first by the binary).

use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::infra::SegmentId;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => {
                write!(formatter, "{} environment variable is required, see .env.example", key)
            }
            ConfigError::Invalid { key, value, reason } => {
                write!(formatter, "{}='{}' is invalid: {}", key, value, reason)
            }
        }
    }
}

impl Error for ConfigError {}

/// Everything the route-planning environment needs. There are no defaults:
/// each field comes from the scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub start_segment: SegmentId,
    /// Reaching this segment ends the episode without success.
    pub reverse_start_segment: Option<SegmentId>,
    /// Goals in the order they must be reached; the last one is the destination.
    pub goal_segments: Vec<SegmentId>,
    /// Route the controlled vehicle is inserted on.
    pub base_route: String,
    /// Progress reward used instead of the default on these segments.
    pub preferred_segments: HashMap<SegmentId, f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SumoConfig {
    pub binary: String,
    pub config_file: Option<String>,
    pub net_file: String,
    pub host: String,
    pub port: u16,
    /// Start the simulator ourselves instead of connecting to a running one.
    pub launch: bool,
    pub connect_retries: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub seed: Option<u64>,
    pub routes_folder: Option<String>,
    pub checkpoint_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub enabled: bool,
    pub traffic_routes: Vec<String>,
    pub traffic_vehicles: usize,
    /// Background vehicles depart uniformly within this many seconds.
    pub depart_window: u32,
    pub max_ticks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub sumo: SumoConfig,
    pub env: EnvConfig,
    pub training: TrainingConfig,
    pub replay: ReplayConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let sumo = SumoConfig {
            binary: vars.or("SUMO_BINARY", "sumo"),
            config_file: vars.optional("SUMO_CONFIG"),
            net_file: vars.required("SUMO_NET_FILE")?,
            host: vars.or("SUMO_HOST", "127.0.0.1"),
            port: vars.parsed_or("SUMO_PORT", 8813)?,
            launch: vars.parsed_or("SUMO_LAUNCH", true)?,
            connect_retries: vars.parsed_or("SUMO_CONNECT_RETRIES", 20)?,
        };
        if sumo.launch && sumo.config_file.is_none() {
            return Err(ConfigError::Missing("SUMO_CONFIG"));
        }

        let goal_segments = split_list(&vars.required("ROUTE_END_EDGES")?);
        if goal_segments.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ROUTE_END_EDGES",
                value: String::new(),
                reason: "at least one goal edge is required".to_string(),
            });
        }

        let env = EnvConfig {
            start_segment: vars.required("ROUTE_START_EDGE")?,
            reverse_start_segment: vars.optional("ROUTE_REV_START_EDGE"),
            goal_segments,
            base_route: vars.required("ROUTE_BASE_ROUTE")?,
            preferred_segments: parse_preferred(
                &vars.optional("ROUTE_PREFERRED_ROADS").unwrap_or_default(),
            )?,
        };

        let training = TrainingConfig {
            epochs: vars.parsed_or("TRAIN_EPOCHS", 40)?,
            steps_per_epoch: vars.parsed_or("TRAIN_STEPS_PER_EPOCH", 4000)?,
            seed: vars.parsed("TRAIN_SEED")?,
            routes_folder: vars.optional("ROUTES_FOLDER"),
            checkpoint_dir: vars.or("CHECKPOINT_DIR", "checkpoints"),
        };

        let replay = ReplayConfig {
            enabled: vars.parsed_or("REPLAY_ENABLED", true)?,
            traffic_routes: split_list(&vars.optional("REPLAY_TRAFFIC_ROUTES").unwrap_or_default()),
            traffic_vehicles: vars.parsed_or("REPLAY_TRAFFIC_VEHICLES", 400)?,
            depart_window: vars.parsed_or("REPLAY_DEPART_WINDOW", 600)?,
            max_ticks: vars.parsed_or("REPLAY_MAX_TICKS", 36_000)?,
        };

        Ok(Self {
            sumo,
            env,
            training,
            replay,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and empty values are treated the same.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| ConfigError::Invalid {
                    key,
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parsed_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parsed(key)?.unwrap_or(default))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `edge=bonus` pairs separated by commas.
fn parse_preferred(value: &str) -> Result<HashMap<SegmentId, f32>, ConfigError> {
    split_list(value)
        .into_iter()
        .map(|pair| {
            let invalid = |reason: String| ConfigError::Invalid {
                key: "ROUTE_PREFERRED_ROADS",
                value: pair.clone(),
                reason,
            };
            let (edge, bonus) = pair
                .rsplit_once('=')
                .ok_or_else(|| invalid("expected edge=bonus".to_string()))?;
            let bonus = bonus
                .trim()
                .parse::<f32>()
                .map_err(|e| invalid(e.to_string()))?;
            Ok((edge.trim().to_string(), bonus))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("SUMO_NET_FILE", "scenario_7/bari.net.xml"),
        ("SUMO_CONFIG", "scenario_7/bari.sumocfg"),
        ("ROUTE_START_EDGE", "E4"),
        ("ROUTE_END_EDGES", "E1, 48563882#0"),
        ("ROUTE_BASE_ROUTE", "r_0"),
        ("ROUTE_PREFERRED_ROADS", "29980621#4=5,E3=5, E6 = 2.5"),
    ];

    #[test]
    fn test_defaults_and_lists() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.sumo.binary, "sumo");
        assert_eq!(config.sumo.port, 8813);
        assert!(config.sumo.launch);
        assert_eq!(config.env.goal_segments, vec!["E1", "48563882#0"]);
        assert_eq!(config.env.reverse_start_segment, None);
        assert_eq!(config.env.preferred_segments.get("29980621#4"), Some(&5.0));
        assert_eq!(config.env.preferred_segments.get("E6"), Some(&2.5));
        assert_eq!(config.training.epochs, 40);
        assert_eq!(config.training.seed, None);
        assert_eq!(config.replay.traffic_vehicles, 400);
        assert!(config.replay.traffic_routes.is_empty());
    }

    #[test]
    fn test_missing_goal_edges() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "ROUTE_END_EDGES")
            .collect();
        assert_eq!(
            AppConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Missing("ROUTE_END_EDGES"))
        );
    }

    #[test]
    fn test_launch_requires_sumo_config() {
        let mut vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "SUMO_CONFIG")
            .collect();
        assert_eq!(
            AppConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Missing("SUMO_CONFIG"))
        );

        vars.push(("SUMO_LAUNCH", "false"));
        let config = AppConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(!config.sumo.launch);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut vars = BASE.to_vec();
        vars.push(("TRAIN_EPOCHS", "many"));
        let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TRAIN_EPOCHS", .. }));

        let mut vars = BASE.to_vec();
        vars.retain(|(k, _)| *k != "ROUTE_PREFERRED_ROADS");
        vars.push(("ROUTE_PREFERRED_ROADS", "E3"));
        let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ROUTE_PREFERRED_ROADS", .. }));
    }

    #[test]
    fn test_env_example_loads() {
        let vars: Vec<(&str, &str)> = include_str!("../.env.example")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .collect();

        let config = AppConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.env.goal_segments, vec!["E1", "G"]);
        assert_eq!(config.env.reverse_start_segment.as_deref(), Some("-E4"));
        assert_eq!(config.env.preferred_segments.len(), 2);
        assert_eq!(config.training.seed, Some(42));
        assert_eq!(config.replay.traffic_routes, vec!["r_0", "r_1"]);
        assert!(
            ConfigError::Missing("SUMO_NET_FILE")
                .to_string()
                .contains(".env.example")
        );
    }
}
