//! Episode statistics for RL training

use std::collections::VecDeque;

use crate::infra::SegmentId;

/// Number of finished episodes the reported reward mean is smoothed over.
pub const REWARD_WINDOW: usize = 100;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size
            && let Some(old) = self.values.pop_front()
        {
            self.sum -= old;
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accumulates rewards step by step and keeps a window of finished episodes.
///
/// The window spans epochs, so an epoch without a finished episode still
/// reports the mean of the previous ones.
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    episode_reward: f32,
    episode_length: usize,
    rewards: MovingAverage,
    lengths: MovingAverage,
    /// Episodes finished since `start_epoch`
    epoch_episodes: usize,
    /// Steps taken since `start_epoch`
    epoch_steps: usize,
    total_episodes: usize,
}

impl EpisodeTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_reward: 0.0,
            episode_length: 0,
            rewards: MovingAverage::new(window_size),
            lengths: MovingAverage::new(window_size),
            epoch_episodes: 0,
            epoch_steps: 0,
            total_episodes: 0,
        }
    }

    pub fn start_epoch(&mut self) {
        self.epoch_episodes = 0;
        self.epoch_steps = 0;
    }

    pub fn record_step(&mut self, reward: f32, done: bool) {
        self.episode_reward += reward;
        self.episode_length += 1;
        self.epoch_steps += 1;

        if done {
            self.rewards.push(self.episode_reward);
            self.lengths.push(self.episode_length as f32);
            self.episode_reward = 0.0;
            self.episode_length = 0;
            self.epoch_episodes += 1;
            self.total_episodes += 1;
        }
    }

    /// `None` until the first episode finishes.
    pub fn episode_reward_mean(&self) -> Option<f32> {
        if self.rewards.is_empty() {
            None
        } else {
            Some(self.rewards.average())
        }
    }

    pub fn episode_length_mean(&self) -> Option<f32> {
        if self.lengths.is_empty() {
            None
        } else {
            Some(self.lengths.average())
        }
    }

    pub fn epoch_episodes(&self) -> usize {
        self.epoch_episodes
    }

    pub fn epoch_steps(&self) -> usize {
        self.epoch_steps
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }
}

impl Default for EpisodeTracker {
    fn default() -> Self {
        Self::new(REWARD_WINDOW)
    }
}

/// Outcome of one training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochResult {
    pub epoch: usize,
    pub episode_reward_mean: Option<f32>,
    /// Episodes finished during the epoch
    pub episodes: usize,
    /// Routes of the successful episodes, in the order they were found
    pub routes: Vec<Vec<SegmentId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut avg = MovingAverage::new(3);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);

        avg.push(2.0);
        assert!((avg.average() - 1.5).abs() < 1e-6);

        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // Pushes out 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
        assert_eq!(avg.len(), 3);
    }

    #[test]
    fn test_tracker_means_over_finished_episodes() {
        let mut tracker = EpisodeTracker::new(10);
        tracker.start_epoch();
        assert_eq!(tracker.episode_reward_mean(), None);

        tracker.record_step(1.0, false);
        tracker.record_step(10.0, false);
        tracker.record_step(10.0, true);
        tracker.record_step(-10.0, true);
        // unfinished episode does not count
        tracker.record_step(1.0, false);

        assert_eq!(tracker.epoch_episodes(), 2);
        assert_eq!(tracker.epoch_steps(), 5);
        assert!((tracker.episode_reward_mean().unwrap() - 5.5).abs() < 1e-6);
        assert!((tracker.episode_length_mean().unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_tracker_window_spans_epochs() {
        let mut tracker = EpisodeTracker::new(2);
        tracker.start_epoch();
        tracker.record_step(4.0, true);
        tracker.record_step(2.0, true);

        tracker.start_epoch();
        assert_eq!(tracker.epoch_episodes(), 0);
        assert!((tracker.episode_reward_mean().unwrap() - 3.0).abs() < 1e-6);

        tracker.record_step(8.0, true);
        assert!((tracker.episode_reward_mean().unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(tracker.total_episodes(), 3);
    }
}
