//! Decides when training stops and when a checkpoint is worth saving.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{Result, StriateError};
use crate::train::history::TrainingHistory;
use crate::train::train_config::TrainConfig;

/// Trailing window of the smooth scheduler.
pub const SMOOTH_STEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Never stops; the epoch limit alone ends training.
    #[default]
    Increment,
    /// Stops once the trailing mean validation accuracy drops.
    Smooth,
}

impl FromStr for SchedulerKind {
    type Err = StriateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "increment" => Ok(SchedulerKind::Increment),
            "smooth" => Ok(SchedulerKind::Smooth),
            other => Err(StriateError::UnknownScheduler(other.to_string())),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Increment => write!(f, "increment"),
            SchedulerKind::Smooth => write!(f, "smooth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scheduler {
    Increment,
    Smooth(SmoothScheduler),
}

impl Scheduler {
    /// Fails unless the trainer tests and saves at the same frequency and
    /// validates on exactly one batch: the smooth statistics assume one fresh
    /// sample per evaluation round.
    pub fn new(kind: SchedulerKind, config: &TrainConfig) -> Result<Scheduler> {
        if config.test_freq == 0 {
            return Err(StriateError::SchedulerPrecondition("the test freq must be positive".to_string()));
        }
        if config.test_freq != config.save_freq {
            return Err(StriateError::SchedulerPrecondition(format!(
                "the save freq ({}) must be equal to test freq ({})",
                config.save_freq, config.test_freq
            )));
        }
        if config.test_range.len() != 1 {
            return Err(StriateError::SchedulerPrecondition(format!(
                "the test set could only have one batch, got {}",
                config.test_range.len()
            )));
        }
        Ok(match kind {
            SchedulerKind::Increment => Scheduler::Increment,
            SchedulerKind::Smooth => Scheduler::Smooth(SmoothScheduler::new()),
        })
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            Scheduler::Increment => SchedulerKind::Increment,
            Scheduler::Smooth(_) => SchedulerKind::Smooth,
        }
    }

    pub fn check_continue_training(&self) -> bool {
        match self {
            Scheduler::Increment => true,
            Scheduler::Smooth(s) => s.keep,
        }
    }

    pub fn check_test_data(&self) -> bool {
        true
    }

    /// Polled after each batch that is a save candidate. The smooth variant
    /// folds in a new validation round when one has appeared since the last
    /// poll and answers with the resulting continue flag.
    pub fn check_save_checkpoint(&mut self, history: &TrainingHistory) -> bool {
        match self {
            Scheduler::Increment => true,
            Scheduler::Smooth(s) => s.observe(history),
        }
    }

    pub fn reset(&mut self) {
        if let Scheduler::Smooth(s) = self {
            *s = SmoothScheduler::new();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothScheduler {
    test_accu: Vec<f64>,
    step: usize,
    prev_avg: f64,
    num_test_outputs: usize,
    keep: bool,
}

impl Default for SmoothScheduler {
    fn default() -> Self {
        SmoothScheduler::new()
    }
}

impl SmoothScheduler {
    pub fn new() -> SmoothScheduler {
        SmoothScheduler { test_accu: vec![], step: SMOOTH_STEP, prev_avg: 0.0, num_test_outputs: 0, keep: true }
    }

    pub fn accuracies(&self) -> &[f64] {
        &self.test_accu
    }

    pub fn previous_average(&self) -> f64 {
        self.prev_avg
    }

    pub fn is_continuing(&self) -> bool {
        self.keep
    }

    fn observe(&mut self, history: &TrainingHistory) -> bool {
        let Some(last) = history.last_test() else {
            return true;
        };
        let num = history.test_outputs.len();
        if num != self.num_test_outputs {
            self.num_test_outputs = num;
            self.record_accuracy(1.0 - last.logprob.error);
        }
        self.keep
    }

    /// Appends one validation accuracy and re-evaluates the trend.
    ///
    /// The window compared is the `step` samples before the newest one.
    pub fn record_accuracy(&mut self, accuracy: f64) -> bool {
        self.test_accu.push(accuracy);
        if !self.keep {
            return false;
        }
        let len = self.test_accu.len();
        if len <= self.step {
            return true;
        }
        let window = &self.test_accu[len - 1 - self.step..len - 1];
        let avg = window.iter().sum::<f64>() / self.step as f64;
        if avg < self.prev_avg {
            log::info!(
                "validation accuracy trend fell from {:.4} to {:.4}, stopping",
                self.prev_avg,
                avg
            );
            self.keep = false;
        } else {
            self.prev_avg = avg;
        }
        self.keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("smooth".parse::<SchedulerKind>().unwrap(), SchedulerKind::Smooth);
        assert_eq!("increment".parse::<SchedulerKind>().unwrap(), SchedulerKind::Increment);
        assert!(matches!("adaptive".parse::<SchedulerKind>(), Err(StriateError::UnknownScheduler(_))));
    }

    #[test]
    fn window_excludes_newest_sample() {
        let mut s = SmoothScheduler::new();
        for a in [1.0, 1.0, 1.0, 1.0, 1.0] {
            assert!(s.record_accuracy(a));
        }
        // a very low sixth sample does not enter its own comparison window
        assert!(s.record_accuracy(0.0));
        assert_eq!(s.previous_average(), 1.0);
    }
}
