pub mod error;
pub mod math;
pub mod engine;
pub mod neuron;
pub mod layers;
pub mod network;
pub mod scheduler;
pub mod train;

// Convenience re-exports
pub use error::{Result, StriateError};
pub use math::{Matrix, Shape};
pub use engine::{ComputeEngine, Context, CpuEngine};
pub use neuron::Neuron;
pub use layers::Layer;
pub use network::{Network, NetworkSpec, LayerSpec, LayerKindSpec};
pub use scheduler::{Scheduler, SchedulerKind};
pub use train::{DataBatch, TrainConfig, Trainer};
