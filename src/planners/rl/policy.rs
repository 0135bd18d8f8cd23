//! Actor-critic networks over one-hot segment observations using Burn

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::env::ACTION_COUNT;

/// Configuration for the actor-critic networks and the PPO objective
#[derive(Debug, Config)]
pub struct PolicyConfig {
    /// Hidden layer size for both networks
    pub hidden_size: usize,
    /// Number of hidden layers
    pub num_layers: usize,
    /// Entropy coefficient for exploration
    pub entropy_coef: f32,
    /// Value loss coefficient
    pub value_coef: f32,
    /// PPO clip parameter
    pub clip_epsilon: f32,
    /// Discount factor
    pub gamma: f32,
    /// GAE lambda
    pub gae_lambda: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hidden_size: 256,
            num_layers: 2,
            entropy_coef: 0.0,
            value_coef: 1.0,
            clip_epsilon: 0.3,
            gamma: 0.99,
            gae_lambda: 1.0,
        }
    }
}

/// Multi-layer perceptron shared by the actor and the critic layouts
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    input: Linear<B>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    pub fn new(device: &B::Device, input_size: usize, output_size: usize, config: &PolicyConfig) -> Self {
        let input = LinearConfig::new(input_size, config.hidden_size).init(device);

        let mut hidden = Vec::new();
        for _ in 1..config.num_layers {
            hidden.push(LinearConfig::new(config.hidden_size, config.hidden_size).init(device));
        }

        let output = LinearConfig::new(config.hidden_size, output_size).init(device);

        Self {
            input,
            hidden,
            output,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.input.forward(x));

        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }

        self.output.forward(x)
    }
}

/// Policy network: segment one-hot → action logits
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Actor<B> {
    pub fn new(device: &B::Device, num_segments: usize, config: &PolicyConfig) -> Self {
        Self {
            net: Mlp::new(device, num_segments, ACTION_COUNT, config),
        }
    }

    pub fn probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.net.forward(obs), 1)
    }

    /// Sample one action per row. Returns (action_index, log_prob)
    pub fn sample_action(&self, obs: Tensor<B, 2>) -> (Tensor<B, 1, Int>, Tensor<B, 1>) {
        let probs = self.probs(obs);

        // Gumbel-max: argmax(log p + g) samples from the categorical
        let uniform = Tensor::<B, 2>::random(
            probs.shape(),
            burn::tensor::Distribution::Uniform(1e-10, 1.0),
            &probs.device(),
        );
        let gumbel = -(-uniform.log()).log();
        let log_probs = probs.log();
        let action: Tensor<B, 2, Int> = (log_probs.clone() + gumbel).argmax(1);

        let action_log_prob = log_probs.gather(1, action.clone()).squeeze(1);

        (action.squeeze(1), action_log_prob)
    }

    /// Log probs and entropy of the given actions under the current policy
    pub fn evaluate_actions(&self, obs: Tensor<B, 2>, actions: Tensor<B, 1, Int>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let probs = self.probs(obs);
        let log_probs = probs.clone().log();

        let batch_size = actions.dims()[0];
        let actions_2d = actions.reshape([batch_size, 1]);
        let action_log_prob = log_probs.clone().gather(1, actions_2d).squeeze(1);

        // -sum(p * log(p))
        let entropy = -(probs * log_probs).sum_dim(1).squeeze(1);

        (action_log_prob, entropy)
    }
}

/// Value network: segment one-hot → state value
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Critic<B> {
    pub fn new(device: &B::Device, num_segments: usize, config: &PolicyConfig) -> Self {
        Self {
            net: Mlp::new(device, num_segments, 1, config),
        }
    }

    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        self.net.forward(obs).squeeze(1)
    }
}

#[derive(Module, Debug)]
pub struct RoutePolicy<B: Backend> {
    pub actor: Actor<B>,
    pub critic: Critic<B>,
}

impl<B: Backend> RoutePolicy<B> {
    pub fn new(device: &B::Device, num_segments: usize, config: &PolicyConfig) -> Self {
        Self {
            actor: Actor::new(device, num_segments, config),
            critic: Critic::new(device, num_segments, config),
        }
    }
}

/// One-hot rows for a batch of segment indices.
pub fn one_hot<B: Backend>(observations: &[usize], num_segments: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut flat = vec![0.0f32; observations.len() * num_segments];
    for (row, &observation) in observations.iter().enumerate() {
        flat[row * num_segments + observation] = 1.0;
    }
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([observations.len(), num_segments])
}

/// Rollout buffer for storing trajectories
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    pub observations: Vec<usize>,
    pub actions: Vec<i64>,
    pub log_probs: Vec<f32>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub values: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: usize, action: i64, log_prob: f32, reward: f32, done: bool, value: f32) {
        self.observations.push(observation);
        self.actions.push(action);
        self.log_probs.push(log_prob);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
    }

    /// Compute returns and advantages using GAE
    pub fn compute_returns_and_advantages(&self, last_value: f32, gamma: f32, gae_lambda: f32) -> (Vec<f32>, Vec<f32>) {
        let n = self.len();
        let mut returns = vec![0.0; n];
        let mut advantages = vec![0.0; n];

        let mut gae = 0.0;
        let mut next_value = last_value;

        for t in (0..n).rev() {
            let not_done = if self.dones[t] { 0.0 } else { 1.0 };
            let delta = self.rewards[t] + gamma * next_value * not_done - self.values[t];
            gae = delta + gamma * gae_lambda * not_done * gae;
            advantages[t] = gae;
            returns[t] = gae + self.values[t];
            next_value = self.values[t];
        }

        (returns, advantages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_one_hot_rows() {
        let device = Default::default();
        let tensor = one_hot::<TestBackend>(&[2, 0], 3, &device);

        assert_eq!(tensor.dims(), [2, 3]);
        let values: Vec<f32> = tensor.into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sampled_actions_are_in_range() {
        let device = Default::default();
        let config = PolicyConfig {
            hidden_size: 16,
            ..PolicyConfig::default()
        };
        let policy = RoutePolicy::<TestBackend>::new(&device, 5, &config);

        let (actions, log_probs) = policy.actor.sample_action(one_hot(&[0, 1, 4], 5, &device));

        let actions: Vec<i64> = actions.into_data().to_vec().unwrap();
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| (0..ACTION_COUNT as i64).contains(a)));
        let log_probs: Vec<f32> = log_probs.into_data().to_vec().unwrap();
        assert!(log_probs.iter().all(|p| *p <= 0.0));
    }

    #[test]
    fn test_gae_stops_at_episode_end() {
        let mut buffer = RolloutBuffer::new();
        buffer.push(0, 0, 0.0, 1.0, false, 0.0);
        buffer.push(1, 0, 0.0, 10.0, true, 0.0);
        buffer.push(0, 0, 0.0, 1.0, false, 0.0);

        let (returns, advantages) = buffer.compute_returns_and_advantages(5.0, 1.0, 1.0);

        assert_eq!(returns, vec![11.0, 10.0, 6.0]);
        assert_eq!(advantages, returns);
        assert_eq!(buffer.len(), 3);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
