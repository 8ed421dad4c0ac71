use serde::{Serialize, Deserialize};

/// Per-epoch statistics emitted by `Trainer::train`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the trainer
/// sends one `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Upper bound on epochs for this run.
    pub total_epochs: usize,
    /// Mean log-loss over the batches trained in this epoch.
    pub train_cost: f64,
    /// Mean classification error over the batches trained in this epoch.
    pub train_error: f64,
    /// Latest validation result, if an evaluation round has happened.
    pub test_cost: Option<f64>,
    pub test_error: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
