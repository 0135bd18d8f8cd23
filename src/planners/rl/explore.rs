use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::infra::{RoadGraph, RouteSink, Simulator};

use super::env::{ACTION_COUNT, EnvError, RoutePlannerEnv};
use super::metrics::EpisodeTracker;
use super::trainer::Trainer;

/// Uniformly random policy. Used when no learning backend is compiled in.
pub struct RandomExplorer {
    rng: StdRng,
    steps_per_epoch: usize,
}

impl RandomExplorer {
    pub fn new(steps_per_epoch: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng, steps_per_epoch }
    }

    pub fn choose_action(&mut self) -> usize {
        self.rng.random_range(0..ACTION_COUNT)
    }
}

impl Trainer for RandomExplorer {
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
        for _ in 0..self.steps_per_epoch {
            let action = self.choose_action();
            let transition = env.step(action).await?;
            tracker.record_step(transition.reward, transition.done);
            *observation = if transition.done {
                env.reset()
            } else {
                transition.observation
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_stay_in_action_space() {
        let mut explorer = RandomExplorer::new(10, Some(3));
        let mut seen = [false; ACTION_COUNT];
        for _ in 0..200 {
            seen[explorer.choose_action()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_seed_makes_actions_repeatable() {
        let mut first = RandomExplorer::new(10, Some(42));
        let mut second = RandomExplorer::new(10, Some(42));
        let a: Vec<usize> = (0..20).map(|_| first.choose_action()).collect();
        let b: Vec<usize> = (0..20).map(|_| second.choose_action()).collect();
        assert_eq!(a, b);
    }
}
