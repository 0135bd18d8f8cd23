use tracing::info;

use crate::infra::{RoadGraph, RouteCollector, RouteSink, Simulator};

use super::env::{EnvError, RoutePlannerEnv};
use super::metrics::{EpisodeTracker, EpochResult};

/// A policy that can drive the environment for one epoch of training.
#[allow(async_fn_in_trait)]
pub trait Trainer {
    /// Run one epoch starting from `observation`, leaving it at the
    /// observation the next epoch continues from.
    async fn run_epoch<S, G, K>(
        &mut self,
        env: &mut RoutePlannerEnv<S, G, K>,
        observation: &mut usize,
        tracker: &mut EpisodeTracker,
    ) -> Result<(), EnvError>
    where
        S: Simulator,
        G: RoadGraph,
        K: RouteSink;
}

/// Train for `epochs` epochs, collecting the routes found during each one
/// from `routes`.
pub async fn train<S, G, K, T>(
    env: &mut RoutePlannerEnv<S, G, K>,
    trainer: &mut T,
    routes: &RouteCollector,
    epochs: usize,
) -> Result<Vec<EpochResult>, EnvError>
where
    S: Simulator,
    G: RoadGraph,
    K: RouteSink,
    T: Trainer,
{
    let mut tracker = EpisodeTracker::default();
    let mut observation = env.reset();
    let mut results = Vec::with_capacity(epochs);

    info!("Starting training for {} epochs", epochs);

    for epoch in 0..epochs {
        tracker.start_epoch();
        trainer.run_epoch(env, &mut observation, &mut tracker).await?;

        let episode_reward_mean = tracker.episode_reward_mean();
        let found = routes.take_routes();
        info!(
            "epoch: {} - episode_reward_mean: {}",
            epoch,
            episode_reward_mean
                .map(|mean| format!("{:.3}", mean))
                .unwrap_or_else(|| "nan".to_string())
        );
        info!(
            "  episodes={}, steps={}, episode_len_mean={}, routes found={}",
            tracker.epoch_episodes(),
            tracker.epoch_steps(),
            tracker
                .episode_length_mean()
                .map(|mean| format!("{:.1}", mean))
                .unwrap_or_else(|| "nan".to_string()),
            found.len()
        );

        results.push(EpochResult {
            epoch,
            episode_reward_mean,
            episodes: tracker.epoch_episodes(),
            routes: found,
        });
    }

    info!("Training complete after {} episodes", tracker.total_episodes());
    Ok(results)
}
