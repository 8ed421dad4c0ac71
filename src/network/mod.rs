pub mod network;
pub mod spec;

pub use network::{Network, NetworkCheckpoint};
pub use spec::{LayerKindSpec, LayerSpec, NetworkSpec};
