use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::scheduler::SchedulerKind;
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `Trainer` run.
///
/// # Fields
/// - `num_epochs`: upper bound on full passes over the training batches
/// - `batch_size`: cases per batch; the network is resized to match
/// - `test_freq`: evaluate the validation batch every this many trained batches
/// - `save_freq`: consider a checkpoint every this many trained batches
/// - `test_range`: indices of the validation batches to evaluate
/// - `scheduler`: `increment` or `smooth`
/// - `learning_rate_decay`: factor applied through `scale_learning_rate` after each epoch
/// - `checkpoint_path`: where checkpoints go; none means checkpoints are only logged
/// - `progress_tx`: optional channel; one `EpochStats` per completed epoch.
///                           If the receiver is dropped training stops.
/// - `stop_flag`: optional atomic flag; when set from another thread
///                           training stops after the current batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainConfig {
    pub num_epochs: usize,
    pub batch_size: usize,
    pub test_freq: usize,
    pub save_freq: usize,
    pub test_range: Vec<usize>,
    pub scheduler: SchedulerKind,
    pub learning_rate_decay: Option<f32>,
    pub checkpoint_path: Option<PathBuf>,
    #[serde(skip)]
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    #[serde(skip)]
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            num_epochs: 30,
            batch_size: 128,
            test_freq: 100,
            save_freq: 100,
            test_range: vec![0],
            scheduler: SchedulerKind::Increment,
            learning_rate_decay: None,
            checkpoint_path: None,
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig` with no progress channel and no stop flag.
    pub fn new(num_epochs: usize, batch_size: usize, scheduler: SchedulerKind) -> Self {
        TrainConfig { num_epochs, batch_size, scheduler, ..TrainConfig::default() }
    }

    /// Evaluates and considers saving every `freq` batches.
    pub fn with_test_freq(mut self, freq: usize) -> Self {
        self.test_freq = freq;
        self.save_freq = freq;
        self
    }

    /// Deserializes a `TrainConfig` from a JSON file. Missing fields take defaults.
    pub fn load_json(path: &str) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TrainConfig =
            serde_json::from_str(r#"{"numEpochs": 5, "scheduler": "smooth", "learningRateDecay": 0.5}"#).unwrap();
        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.scheduler, SchedulerKind::Smooth);
        assert_eq!(config.learning_rate_decay, Some(0.5));
        assert_eq!(config.test_freq, config.save_freq);
        assert_eq!(config.test_range, vec![0]);
    }
}
