//! Compute engine seam.
//!
//! Layers never loop over pixels themselves: every image kernel goes through
//! [`ComputeEngine`], reached via the [`Context`] handle a layer receives at
//! construction. Dense matrix primitives live on [`Matrix`].

pub mod cpu;

use std::fmt;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::math::matrix::Matrix;
use crate::neuron::Neuron;

pub use cpu::CpuEngine;

/// Geometry of a square correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub channels: usize,
    pub img_size: usize,
    pub num_filter: usize,
    pub filter_size: usize,
    pub padding: usize,
    pub stride: usize,
    pub output_size: usize,
}

/// Geometry of a square max-pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub channels: usize,
    pub img_size: usize,
    pub pool_size: usize,
    pub start: usize,
    pub stride: usize,
    pub output_size: usize,
}

/// Cross-channel local response normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormGeometry {
    pub channels: usize,
    /// Pixels per channel (height * width).
    pub pixels: usize,
    pub size: usize,
    pub scale: f32,
    pub pow: f32,
}

/// Numeric primitives consumed by the layers.
///
/// All tensors are `features x batch` matrices. Kernels that produce an input
/// gradient overwrite their target; `conv_weight_grad` accumulates.
pub trait ComputeEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Correlates `filters` over the zero-padded `input`.
    fn conv_forward(&self, input: &Matrix, filters: &Matrix, output: &mut Matrix, geom: &ConvGeometry);

    /// Adjoint of `conv_forward` with respect to its input.
    fn conv_input_grad(&self, out_grad: &Matrix, filters: &Matrix, in_grad: &mut Matrix, geom: &ConvGeometry);

    /// Adds the filter gradient of the whole batch into `filter_grad`.
    fn conv_weight_grad(&self, input: &Matrix, out_grad: &Matrix, filter_grad: &mut Matrix, geom: &ConvGeometry);

    fn max_pool(&self, input: &Matrix, output: &mut Matrix, geom: &PoolGeometry);

    /// Routes `out_grad` back to the input positions holding each window max.
    ///
    /// Every input tied for a window max receives the full output gradient,
    /// so ties count that gradient more than once.
    fn max_unpool(
        &self,
        input: &Matrix,
        out_grad: &Matrix,
        output: &Matrix,
        in_grad: &mut Matrix,
        geom: &PoolGeometry,
    );

    /// Writes the denominators into `denom` and the normalized values into `output`.
    fn response_norm(&self, input: &Matrix, denom: &mut Matrix, output: &mut Matrix, geom: &NormGeometry);

    fn response_norm_grad(
        &self,
        out_grad: &Matrix,
        denom: &Matrix,
        input: &Matrix,
        output: &Matrix,
        in_grad: &mut Matrix,
        geom: &NormGeometry,
    );

    fn activate(&self, neuron: &Neuron, input: &Matrix, output: &mut Matrix);

    /// Activation derivative expressed through the forward output.
    fn activation_grad(&self, neuron: &Neuron, out_grad: &Matrix, output: &Matrix, in_grad: &mut Matrix);
}

/// Device handle threaded through layer construction.
///
/// Cloning is cheap: clones share the engine and the initialization RNG.
#[derive(Clone)]
pub struct Context {
    engine: Arc<dyn ComputeEngine>,
    rng: Arc<Mutex<StdRng>>,
}

impl Context {
    /// Host engine with an entropy-seeded RNG.
    pub fn cpu() -> Context {
        Context::with_engine(Arc::new(CpuEngine), StdRng::from_entropy())
    }

    /// Host engine with a fixed seed, for reproducible initialization.
    pub fn seeded(seed: u64) -> Context {
        Context::with_engine(Arc::new(CpuEngine), StdRng::seed_from_u64(seed))
    }

    pub fn with_engine(engine: Arc<dyn ComputeEngine>, rng: StdRng) -> Context {
        log::debug!("compute engine '{}' initialized", engine.name());
        Context { engine, rng: Arc::new(Mutex::new(rng)) }
    }

    pub fn engine(&self) -> &dyn ComputeEngine {
        self.engine.as_ref()
    }

    /// `randn(rows, cols) * scale` drawn from the shared RNG.
    pub fn randn(&self, rows: usize, cols: usize, scale: f32) -> Matrix {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Matrix::randn(rows, cols, scale, &mut *rng)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("engine", &self.engine.name()).finish()
    }
}
