pub mod epoch_stats;
pub mod history;
pub mod train_config;
pub mod trainer;

pub use epoch_stats::EpochStats;
pub use history::{BatchStats, TestRecord, TrainingHistory};
pub use train_config::TrainConfig;
pub use trainer::{DataBatch, StopReason, TrainOutcome, Trainer, TrainerCheckpoint};
