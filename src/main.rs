use dotenv::dotenv;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use route_planner::config::{AppConfig, SumoConfig, TrainingConfig};
use route_planner::infra::{
    CompositeSink, RoadGraph, RoadNetwork, RouteCollector, RouteLogFile, RouteSink, SimError, Simulator,
    TraciConnection,
};
use route_planner::planners::rl::{EnvError, EpochResult, RoutePlannerEnv, train};
use route_planner::planners::{replay_route, select_best_route};

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("route_planner=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

async fn open_connection(sumo: &SumoConfig) -> Result<TraciConnection, SimError> {
    match (&sumo.config_file, sumo.launch) {
        (Some(config_file), true) => {
            TraciConnection::launch(&sumo.binary, config_file, sumo.port, sumo.connect_retries).await
        }
        _ => TraciConnection::connect(&sumo.host, sumo.port, sumo.connect_retries).await,
    }
}

#[cfg(feature = "rl")]
async fn run_training<S, G, K>(
    env: &mut RoutePlannerEnv<S, G, K>,
    routes: &RouteCollector,
    config: &TrainingConfig,
) -> Result<Vec<EpochResult>, EnvError>
where
    S: Simulator,
    G: RoadGraph,
    K: RouteSink,
{
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::backend::Backend;
    use route_planner::planners::rl::{PPOTrainer, TrainConfig};

    type TrainBackend = Autodiff<NdArray>;

    if let Some(seed) = config.seed {
        TrainBackend::seed(seed);
    }
    let train_config = TrainConfig::new(config.steps_per_epoch, config.checkpoint_dir.clone());
    let mut trainer = PPOTrainer::<TrainBackend>::new(Default::default(), env.observation_size(), train_config);
    info!("Training with PPO, checkpoints in {}", config.checkpoint_dir);
    train(env, &mut trainer, routes, config.epochs).await
}

#[cfg(not(feature = "rl"))]
async fn run_training<S, G, K>(
    env: &mut RoutePlannerEnv<S, G, K>,
    routes: &RouteCollector,
    config: &TrainingConfig,
) -> Result<Vec<EpochResult>, EnvError>
where
    S: Simulator,
    G: RoadGraph,
    K: RouteSink,
{
    use route_planner::planners::rl::RandomExplorer;

    info!("Built without the rl feature, exploring with random actions");
    let mut explorer = RandomExplorer::new(config.steps_per_epoch, config.seed);
    train(env, &mut explorer, routes, config.epochs).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let network = RoadNetwork::load(&config.sumo.net_file)?;
    for segment in std::iter::once(&config.env.start_segment).chain(&config.env.goal_segments) {
        if !network.contains(segment) {
            warn!("Segment {} is not part of {}", segment, config.sumo.net_file);
        }
    }
    let connection = open_connection(&config.sumo).await?;

    let routes = RouteCollector::new();
    let mut sinks: Vec<Box<dyn RouteSink>> = vec![Box::new(routes.clone())];
    if let Some(folder) = &config.training.routes_folder {
        sinks.push(Box::new(RouteLogFile::new(folder)?));
    }

    let mut env = RoutePlannerEnv::new(connection, network, CompositeSink::new(sinks), config.env.clone()).await?;
    let results = run_training(&mut env, &routes, &config.training).await?;
    let mut connection = env.shutdown().await?;

    match select_best_route(&results, &config.env.preferred_segments) {
        Some(best) if config.replay.enabled => {
            let mut rng = match config.training.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            replay_route(
                &mut connection,
                &best.route,
                &config.replay,
                &config.env.preferred_segments,
                &mut rng,
            )
            .await?;
        }
        Some(best) => info!("Replay disabled, best route: {}", best.route.join(" ")),
        None => warn!("No route reached the destination, nothing to replay"),
    }

    connection.close().await?;
    Ok(())
}
