//! PPO training loop for the route planner

use std::path::Path;

use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError};
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, warn};

use crate::infra::{RoadGraph, RouteSink, Simulator};

use super::env::{EnvError, RoutePlannerEnv};
use super::metrics::EpisodeTracker;
use super::policy::{PolicyConfig, RolloutBuffer, RoutePolicy, one_hot};
use super::trainer::Trainer;

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Environment steps collected per epoch
    pub steps_per_epoch: usize,
    /// Number of PPO passes over each rollout
    pub ppo_epochs: usize,
    /// Mini-batch size for PPO updates
    pub mini_batch_size: usize,
    pub learning_rate: f64,
    /// Directory for per-epoch checkpoints
    pub checkpoint_dir: String,
    pub policy_config: PolicyConfig,
}

impl TrainConfig {
    pub fn new(steps_per_epoch: usize, checkpoint_dir: String) -> Self {
        Self {
            steps_per_epoch,
            ppo_epochs: 30,
            mini_batch_size: 128,
            learning_rate: 5e-5,
            checkpoint_dir,
            policy_config: PolicyConfig::default(),
        }
    }
}

/// PPO Trainer - collects rollouts and performs PPO updates
pub struct PPOTrainer<B: AutodiffBackend> {
    model: RoutePolicy<B>,
    config: TrainConfig,
    device: B::Device,
    num_segments: usize,
    buffer: RolloutBuffer,
    epoch: usize,
}

impl<B: AutodiffBackend> PPOTrainer<B> {
    pub fn new(device: B::Device, num_segments: usize, config: TrainConfig) -> Self {
        let model = RoutePolicy::new(&device, num_segments, &config.policy_config);

        Self {
            model,
            config,
            device,
            num_segments,
            buffer: RolloutBuffer::new(),
            epoch: 0,
        }
    }

    /// Sample an action and estimate the value of a single observation.
    fn act(&self, observation: usize) -> (i64, f32, f32) {
        let obs = one_hot::<B>(&[observation], self.num_segments, &self.device);
        let (action, log_prob) = self.model.actor.sample_action(obs.clone());
        let value = self.model.critic.forward(obs);

        (
            action.into_scalar().elem::<i64>(),
            log_prob.into_scalar().elem::<f32>(),
            value.into_scalar().elem::<f32>(),
        )
    }

    fn value_of(&self, observation: usize) -> f32 {
        let obs = one_hot::<B>(&[observation], self.num_segments, &self.device);
        self.model.critic.forward(obs).into_scalar().elem::<f32>()
    }

    /// Collect a rollout from the environment
    pub async fn collect_rollout<S, G, K>(
        &mut self,
        env: &mut RoutePlannerEnv<S, G, K>,
        observation: &mut usize,
        tracker: &mut EpisodeTracker,
    ) -> Result<(), EnvError>
    where
        S: Simulator,
        G: RoadGraph,
        K: RouteSink,
    {
        self.buffer.clear();

        for _ in 0..self.config.steps_per_epoch {
            let (action, log_prob, value) = self.act(*observation);
            let transition = env.step(action as usize).await?;
            tracker.record_step(transition.reward, transition.done);

            self.buffer.push(
                *observation,
                action,
                log_prob,
                transition.reward,
                transition.done,
                value,
            );

            *observation = if transition.done {
                env.reset()
            } else {
                transition.observation
            };
        }
        Ok(())
    }

    /// Perform PPO update on collected rollout
    pub fn ppo_update(&mut self, last_value: f32) -> (f32, f32, f32) {
        let buffer = &self.buffer;
        if buffer.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let policy_config = &self.config.policy_config;
        let (returns, advantages) =
            buffer.compute_returns_and_advantages(last_value, policy_config.gamma, policy_config.gae_lambda);

        // Normalize advantages
        let adv_mean: f32 = advantages.iter().sum::<f32>() / advantages.len() as f32;
        let adv_var: f32 = advantages
            .iter()
            .map(|a| (a - adv_mean).powi(2))
            .sum::<f32>()
            / advantages.len() as f32;
        let adv_std = adv_var.sqrt().max(1e-8);
        let normalized_advantages: Vec<f32> = advantages
            .iter()
            .map(|a| (a - adv_mean) / adv_std)
            .collect();

        let mut optimizer = AdamConfig::new().init::<B, RoutePolicy<B>>();
        let mut model = self.model.clone();

        let mut total_policy_loss = 0.0f32;
        let mut total_value_loss = 0.0f32;
        let mut total_entropy = 0.0f32;
        let mut num_updates = 0usize;

        for _ in 0..self.config.ppo_epochs {
            for batch_start in (0..buffer.len()).step_by(self.config.mini_batch_size.max(1)) {
                let batch_end = (batch_start + self.config.mini_batch_size).min(buffer.len());
                let range = batch_start..batch_end;

                let obs = one_hot::<B>(&buffer.observations[range.clone()], self.num_segments, &self.device);
                let actions = Tensor::<B, 1, Int>::from_ints(&buffer.actions[range.clone()], &self.device);
                let old_log_probs = Tensor::<B, 1>::from_floats(&buffer.log_probs[range.clone()], &self.device);
                let returns_tensor = Tensor::<B, 1>::from_floats(&returns[range.clone()], &self.device);
                let advantages_tensor =
                    Tensor::<B, 1>::from_floats(&normalized_advantages[range], &self.device);

                let (new_log_probs, entropy) = model.actor.evaluate_actions(obs.clone(), actions);
                let values = model.critic.forward(obs);

                // PPO clipped objective
                let ratio = (new_log_probs - old_log_probs).exp();
                let clip_epsilon = policy_config.clip_epsilon;
                let clipped_ratio = ratio.clone().clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon);

                let surr1 = ratio * advantages_tensor.clone();
                let surr2 = clipped_ratio * advantages_tensor;
                let policy_loss = -surr1.min_pair(surr2).mean();

                let value_loss = (values - returns_tensor).powf_scalar(2.0).mean();
                let entropy_mean = entropy.mean();

                let loss = policy_loss.clone() + value_loss.clone() * policy_config.value_coef
                    - entropy_mean.clone() * policy_config.entropy_coef;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                total_policy_loss += policy_loss.into_scalar().elem::<f32>();
                total_value_loss += value_loss.into_scalar().elem::<f32>();
                total_entropy += entropy_mean.into_scalar().elem::<f32>();
                num_updates += 1;
            }
        }
        self.model = model;

        let average = |total: f32| if num_updates > 0 { total / num_updates as f32 } else { 0.0 };
        (
            average(total_policy_loss),
            average(total_value_loss),
            average(total_entropy),
        )
    }

    /// Save model checkpoint
    pub fn save_checkpoint(&self, path: &Path) -> Result<(), RecorderError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model.clone().save_file(path.to_path_buf(), &recorder)?;
        debug!("Saved checkpoint to {}", path.display());
        Ok(())
    }
}

impl<B: AutodiffBackend> Trainer for PPOTrainer<B> {
    async fn run_epoch<S, G, K>(
        &mut self,
        env: &mut RoutePlannerEnv<S, G, K>,
        observation: &mut usize,
        tracker: &mut EpisodeTracker,
    ) -> Result<(), EnvError>
    where
        S: Simulator,
        G: RoadGraph,
        K: RouteSink,
    {
        self.collect_rollout(env, observation, tracker).await?;

        let last_value = if self.buffer.dones.last().copied().unwrap_or(true) {
            0.0
        } else {
            self.value_of(*observation)
        };
        let (policy_loss, value_loss, entropy) = self.ppo_update(last_value);
        debug!(
            "Epoch {}: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}",
            self.epoch, policy_loss, value_loss, entropy
        );

        let path = Path::new(&self.config.checkpoint_dir).join(format!("epoch_{}", self.epoch));
        if let Err(e) = std::fs::create_dir_all(&self.config.checkpoint_dir) {
            warn!("Could not create {}: {}", self.config.checkpoint_dir, e);
        } else if let Err(e) = self.save_checkpoint(&path) {
            warn!("Failed to save checkpoint {}: {}", path.display(), e);
        }

        self.epoch += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::infra::scripted::ScriptedSimulator;
    use crate::infra::{RoadNetwork, RouteCollector};
    use crate::planners::rl::trainer::train;
    use burn::backend::{Autodiff, NdArray};
    use std::collections::HashMap;

    type TestBackend = Autodiff<NdArray>;

    #[tokio::test]
    async fn test_ppo_epochs_train_and_checkpoint() {
        let sim = ScriptedSimulator::new(&[("E4", 0.0), ("A", 10.0), ("E1", 20.0)], "E4");
        let graph = RoadNetwork::from_connections([("E4", "A"), ("A", "E1")]);
        let config = EnvConfig {
            start_segment: "E4".to_string(),
            reverse_start_segment: None,
            goal_segments: vec!["E1".to_string()],
            base_route: "r_0".to_string(),
            preferred_segments: HashMap::new(),
        };
        let routes = RouteCollector::new();
        let mut env = RoutePlannerEnv::new(sim, graph, routes.clone(), config)
            .await
            .unwrap();

        let checkpoint_dir = std::env::temp_dir().join(format!("route-planner-ppo-{}", std::process::id()));
        let mut train_config = TrainConfig::new(32, checkpoint_dir.to_string_lossy().into_owned());
        train_config.ppo_epochs = 2;
        train_config.mini_batch_size = 16;
        train_config.policy_config.hidden_size = 16;
        let mut trainer = PPOTrainer::<TestBackend>::new(Default::default(), env.observation_size(), train_config);

        let results = train(&mut env, &mut trainer, &routes, 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.episodes > 0));
        assert!(checkpoint_dir.join("epoch_1.mpk").exists());
        std::fs::remove_dir_all(&checkpoint_dir).ok();
    }
}
