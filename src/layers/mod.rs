//! The closed set of layer kinds and their shared operation table.

pub mod conv;
pub mod fc;
pub mod neuron_layer;
pub mod pool;
pub mod record;
pub mod rnorm;
pub mod softmax;

use crate::error::{Result, StriateError};
use crate::math::{Matrix, Shape};

pub use conv::{ConvLayer, ConvParams};
pub use fc::{FcLayer, FcParams};
pub use neuron_layer::NeuronLayer;
pub use pool::{MaxPoolLayer, PoolParams};
pub use record::{LayerRecord, LegacyLayerRecord};
pub use rnorm::{NormParams, ResponseNormLayer};
pub use softmax::SoftmaxLayer;

#[derive(Debug)]
pub enum Layer {
    Conv(ConvLayer),
    MaxPool(MaxPoolLayer),
    ResponseNorm(ResponseNormLayer),
    FullyConnected(FcLayer),
    Softmax(SoftmaxLayer),
    Neuron(NeuronLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Conv(l) => &l.name,
            Layer::MaxPool(l) => &l.name,
            Layer::ResponseNorm(l) => &l.name,
            Layer::FullyConnected(l) => &l.name,
            Layer::Softmax(l) => &l.name,
            Layer::Neuron(l) => &l.name,
        }
    }

    /// Kind tag, as written in checkpoint records.
    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Conv(_) => "conv",
            Layer::MaxPool(_) => "pool",
            Layer::ResponseNorm(_) => "rnorm",
            Layer::FullyConnected(_) => "fc",
            Layer::Softmax(_) => "softmax",
            Layer::Neuron(_) => "neuron",
        }
    }

    /// Recomputes the output shape from the input shape and caches it.
    pub fn output_shape(&mut self) -> Shape {
        match self {
            Layer::Conv(l) => l.output_shape(),
            Layer::MaxPool(l) => l.output_shape(),
            Layer::ResponseNorm(l) => l.output_shape(),
            Layer::FullyConnected(l) => l.output_shape(),
            Layer::Softmax(l) => l.output_shape(),
            Layer::Neuron(l) => l.output_shape(),
        }
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        match self {
            Layer::Conv(l) => l.cached_output_shape(),
            Layer::MaxPool(l) => l.cached_output_shape(),
            Layer::ResponseNorm(l) => l.cached_output_shape(),
            Layer::FullyConnected(l) => l.cached_output_shape(),
            Layer::Softmax(l) => l.cached_output_shape(),
            Layer::Neuron(l) => l.cached_output_shape(),
        }
    }

    /// Reallocates every batch-sized scratch buffer.
    pub fn change_batch_size(&mut self, batch: usize) {
        match self {
            Layer::Conv(l) => l.change_batch_size(batch),
            Layer::MaxPool(l) => l.change_batch_size(batch),
            Layer::ResponseNorm(l) => l.change_batch_size(batch),
            Layer::FullyConnected(l) => l.change_batch_size(batch),
            Layer::Softmax(l) => l.change_batch_size(batch),
            Layer::Neuron(l) => l.change_batch_size(batch),
        }
    }

    pub fn disable_bprop(&mut self) {
        *self.bprop_flag() = true;
    }

    pub fn is_bprop_disabled(&self) -> bool {
        match self {
            Layer::Conv(l) => l.bprop_disabled,
            Layer::MaxPool(l) => l.bprop_disabled,
            Layer::ResponseNorm(l) => l.bprop_disabled,
            Layer::FullyConnected(l) => l.bprop_disabled,
            Layer::Softmax(l) => l.bprop_disabled,
            Layer::Neuron(l) => l.bprop_disabled,
        }
    }

    fn bprop_flag(&mut self) -> &mut bool {
        match self {
            Layer::Conv(l) => &mut l.bprop_disabled,
            Layer::MaxPool(l) => &mut l.bprop_disabled,
            Layer::ResponseNorm(l) => &mut l.bprop_disabled,
            Layer::FullyConnected(l) => &mut l.bprop_disabled,
            Layer::Softmax(l) => &mut l.bprop_disabled,
            Layer::Neuron(l) => &mut l.bprop_disabled,
        }
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        match self {
            Layer::Conv(l) => l.forward(input, output),
            Layer::MaxPool(l) => l.forward(input, output),
            Layer::ResponseNorm(l) => l.forward(input, output),
            Layer::FullyConnected(l) => l.forward(input, output),
            Layer::Softmax(l) => l.forward(input, output),
            Layer::Neuron(l) => l.forward(input, output),
        }
    }

    /// Writes the input gradient into `in_grad` and refreshes parameter
    /// gradients. Softmax has no output gradient to consume; drive it with
    /// [`SoftmaxLayer::backward_labels`].
    pub fn backward(&mut self, out_grad: &Matrix, input: &Matrix, output: &Matrix, in_grad: &mut Matrix) -> Result<()> {
        match self {
            Layer::Conv(l) => l.backward(out_grad, input, in_grad),
            Layer::MaxPool(l) => l.backward(out_grad, input, output, in_grad),
            Layer::ResponseNorm(l) => l.backward(out_grad, input, output, in_grad),
            Layer::FullyConnected(l) => l.backward(out_grad, input, in_grad),
            Layer::Neuron(l) => l.backward(out_grad, output, in_grad),
            Layer::Softmax(l) => {
                return Err(StriateError::Unimplemented {
                    layer: l.name.clone(),
                    operation: "backward from an output gradient",
                })
            }
        }
        Ok(())
    }

    /// `param += eps / batch * grad`. No-op for parameterless kinds.
    pub fn update(&mut self) {
        match self {
            Layer::Conv(l) => l.update(),
            Layer::FullyConnected(l) => l.update(),
            _ => {}
        }
    }

    pub fn scale_learning_rate(&mut self, factor: f32) {
        match self {
            Layer::Conv(l) => l.scale_learning_rate(factor),
            Layer::FullyConnected(l) => l.scale_learning_rate(factor),
            _ => {}
        }
    }

    pub fn as_softmax(&self) -> Option<&SoftmaxLayer> {
        match self {
            Layer::Softmax(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_softmax_mut(&mut self) -> Option<&mut SoftmaxLayer> {
        match self {
            Layer::Softmax(l) => Some(l),
            _ => None,
        }
    }
}

impl From<ConvLayer> for Layer {
    fn from(l: ConvLayer) -> Self {
        Layer::Conv(l)
    }
}

impl From<MaxPoolLayer> for Layer {
    fn from(l: MaxPoolLayer) -> Self {
        Layer::MaxPool(l)
    }
}

impl From<ResponseNormLayer> for Layer {
    fn from(l: ResponseNormLayer) -> Self {
        Layer::ResponseNorm(l)
    }
}

impl From<FcLayer> for Layer {
    fn from(l: FcLayer) -> Self {
        Layer::FullyConnected(l)
    }
}

impl From<SoftmaxLayer> for Layer {
    fn from(l: SoftmaxLayer) -> Self {
        Layer::Softmax(l)
    }
}

impl From<NeuronLayer> for Layer {
    fn from(l: NeuronLayer) -> Self {
        Layer::Neuron(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Context;

    #[test]
    fn softmax_rejects_generic_backward() {
        let mut layer = Layer::from(SoftmaxLayer::new("probs", (3, 1)));
        let m = Matrix::zeros(3, 1);
        let mut g = Matrix::zeros(3, 1);
        let err = layer.backward(&m, &m, &m, &mut g).unwrap_err();
        assert!(matches!(err, StriateError::Unimplemented { .. }));
    }

    #[test]
    fn disabled_layer_leaves_gradient_untouched() {
        let ctx = Context::seeded(3);
        let mut layer = Layer::from(FcLayer::new(&ctx, "fc", FcParams { output_size: 2, ..FcParams::default() }, (3, 1)));
        layer.disable_bprop();
        assert!(layer.is_bprop_disabled());
        let mut in_grad = Matrix::filled(3, 1, 7.0);
        layer
            .backward(&Matrix::filled(2, 1, 1.0), &Matrix::filled(3, 1, 1.0), &Matrix::zeros(2, 1), &mut in_grad)
            .unwrap();
        assert_eq!(in_grad.data, vec![7.0; 3]);
    }

    #[test]
    fn scale_learning_rate_halves_conv_rates_only() {
        let ctx = Context::seeded(11);
        let params = ConvParams { num_filter: 2, filter_size: 3, padding: 1, ..ConvParams::default() };
        let conv = ConvLayer::new(&ctx, "conv1", params, Shape::square(2, 1, 5)).unwrap();
        let filter_before = conv.filter().clone();
        let bias_before = conv.bias().clone();
        let mut layer = Layer::from(conv);
        layer.scale_learning_rate(0.5);

        let Layer::Conv(conv) = &layer else { unreachable!() };
        assert_eq!(conv.params().eps_w, params.eps_w * 0.5);
        assert_eq!(conv.params().eps_b, params.eps_b * 0.5);
        assert_eq!(conv.params().init_w, params.init_w);
        assert_eq!(conv.params().num_filter, params.num_filter);
        assert_eq!(conv.params().padding, params.padding);
        assert_eq!(conv.filter(), &filter_before);
        assert_eq!(conv.bias(), &bias_before);
    }
}
