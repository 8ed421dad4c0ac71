use std::sync::atomic::Ordering;
use std::time::Instant;

use serde::{Serialize, Deserialize};

use crate::error::{Result, StriateError};
use crate::math::Matrix;
use crate::network::network::{Network, NetworkCheckpoint};
use crate::scheduler::Scheduler;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::{TestRecord, TrainingHistory};
use crate::train::train_config::TrainConfig;

/// One batch of cases: a `features x batch` matrix and a class per column.
#[derive(Debug, Clone)]
pub struct DataBatch {
    pub data: Matrix,
    pub labels: Vec<usize>,
}

impl DataBatch {
    pub fn new(data: Matrix, labels: Vec<usize>) -> DataBatch {
        assert_eq!(data.cols, labels.len(), "one label per column");
        DataBatch { data, labels }
    }
}

/// Full training state as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerCheckpoint {
    pub epoch: usize,
    pub batch: usize,
    pub network: NetworkCheckpoint,
    pub history: TrainingHistory,
}

/// Why `Trainer::train` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EpochLimit,
    Scheduler,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainOutcome {
    pub epochs: usize,
    pub batches: usize,
    pub checkpoints: usize,
    pub reason: StopReason,
}

/// Drives a network over training batches, evaluates the validation batch at
/// `test_freq`, and lets the scheduler decide about checkpoints and stopping.
#[derive(Debug)]
pub struct Trainer {
    network: Network,
    config: TrainConfig,
    scheduler: Scheduler,
    history: TrainingHistory,
    epoch: usize,
    batch: usize,
}

impl Trainer {
    pub fn new(mut network: Network, config: TrainConfig) -> Result<Trainer> {
        let scheduler = Scheduler::new(config.scheduler, &config)?;
        if network.batch_size() != config.batch_size {
            log::info!("resizing network batch from {} to {}", network.batch_size(), config.batch_size);
            network.change_batch_size(config.batch_size);
        }
        Ok(Trainer { network, config, scheduler, history: TrainingHistory::new(), epoch: 0, batch: 0 })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn interrupted(&self) -> bool {
        self.config.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Runs until the epoch limit, a scheduler stop, or an interruption.
    ///
    /// `test_batches` is indexed by `config.test_range`. Every batch, test
    /// batches included, must hold exactly `config.batch_size` cases.
    pub fn train(&mut self, train_batches: &[DataBatch], test_batches: &[DataBatch]) -> Result<TrainOutcome> {
        if train_batches.is_empty() {
            return Err(StriateError::InvalidBatch("no training batches supplied".to_string()));
        }
        let test_index = self.config.test_range[0];
        let test_batch = test_batches.get(test_index).ok_or_else(|| {
            StriateError::InvalidBatch(format!(
                "test batch {test_index} requested but only {} supplied",
                test_batches.len()
            ))
        })?;
        let expected = (self.network.input_shape().features(), self.config.batch_size);
        for batch in train_batches.iter().chain(std::iter::once(test_batch)) {
            if batch.data.shape() != expected {
                return Err(StriateError::InvalidBatch(format!(
                    "batch is {:?}, network expects {:?}",
                    batch.data.shape(),
                    expected
                )));
            }
        }

        let mut checkpoints = 0;
        let mut reason = StopReason::EpochLimit;

        'epochs: while self.epoch < self.config.num_epochs {
            let t_start = Instant::now();
            let first_batch = self.history.train_outputs.len();

            for batch in train_batches {
                if self.interrupted() {
                    reason = StopReason::Interrupted;
                    break 'epochs;
                }
                let stats = self.network.train_batch(&batch.data, &batch.labels)?;
                self.history.train_outputs.push(stats);
                self.batch += 1;

                if self.batch % self.config.test_freq == 0 && self.scheduler.check_test_data() {
                    self.test(test_batch);
                }
                if self.batch % self.config.save_freq == 0 && self.scheduler.check_save_checkpoint(&self.history) {
                    self.save_checkpoint()?;
                    checkpoints += 1;
                }
                if !self.scheduler.check_continue_training() {
                    log::info!("scheduler stopped training at epoch {} batch {}", self.epoch, self.batch);
                    reason = StopReason::Scheduler;
                    self.epoch += 1;
                    break 'epochs;
                }
            }

            self.epoch += 1;
            if let Some(decay) = self.config.learning_rate_decay {
                self.network.scale_learning_rate(decay);
            }

            let train = self.history.train_summary(first_batch);
            let test = self.history.last_test().map(|t| t.logprob);
            let stats = EpochStats {
                epoch: self.epoch,
                total_epochs: self.config.num_epochs,
                train_cost: train.map_or(0.0, |s| s.cost),
                train_error: train.map_or(0.0, |s| s.error),
                test_cost: test.map(|s| s.cost),
                test_error: test.map(|s| s.error),
                elapsed_ms: t_start.elapsed().as_millis() as u64,
            };
            log::info!(
                "epoch {}/{}: train cost {:.5} error {:.4}",
                stats.epoch,
                stats.total_epochs,
                stats.train_cost,
                stats.train_error
            );
            if let Some(ref tx) = self.config.progress_tx {
                // If the receiver has been dropped, stop training.
                if tx.send(stats).is_err() {
                    reason = StopReason::Interrupted;
                    break;
                }
            }
        }

        Ok(TrainOutcome { epochs: self.epoch, batches: self.batch, checkpoints, reason })
    }

    fn test(&mut self, batch: &DataBatch) {
        let stats = self.network.evaluate(&batch.data, &batch.labels);
        log::info!(
            "epoch {} batch {}: validation logprob {:.5} error {:.4}",
            self.epoch,
            self.batch,
            stats.cost,
            stats.error
        );
        self.history.test_outputs.push(TestRecord { epoch: self.epoch, batch: self.batch, logprob: stats });
    }

    pub fn checkpoint(&self) -> Result<TrainerCheckpoint> {
        Ok(TrainerCheckpoint {
            epoch: self.epoch,
            batch: self.batch,
            network: self.network.checkpoint()?,
            history: self.history.clone(),
        })
    }

    fn save_checkpoint(&self) -> Result<()> {
        let Some(path) = &self.config.checkpoint_path else {
            log::debug!("checkpoint due at batch {} but no checkpoint path configured", self.batch);
            return Ok(());
        };
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.checkpoint()?)?;
        log::info!("saved checkpoint to {}", path.display());
        Ok(())
    }
}
