use crate::engine::Context;
use crate::math::{Matrix, Shape};
use crate::neuron::Neuron;

/// Applies a [`Neuron`] element-wise. Output shape equals input shape.
#[derive(Debug)]
pub struct NeuronLayer {
    pub(crate) name: String,
    pub(crate) neuron: Neuron,
    pub(crate) img_shape: Shape,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
    ctx: Context,
}

impl NeuronLayer {
    pub fn new(ctx: &Context, name: &str, neuron: Neuron, img_shape: Shape) -> NeuronLayer {
        NeuronLayer {
            name: name.to_string(),
            neuron,
            img_shape,
            output_shape: None,
            bprop_disabled: false,
            ctx: ctx.clone(),
        }
    }

    pub fn neuron(&self) -> &Neuron {
        &self.neuron
    }

    pub fn output_shape(&mut self) -> Shape {
        self.output_shape = Some(self.img_shape);
        self.img_shape
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        self.output_shape
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.img_shape = self.img_shape.with_batch(batch);
        self.output_shape = None;
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        self.ctx.engine().activate(&self.neuron, input, output);
    }

    pub fn backward(&mut self, out_grad: &Matrix, output: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        self.ctx.engine().activation_grad(&self.neuron, out_grad, output, in_grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_gradient_is_gated_by_output() {
        let mut layer = NeuronLayer::new(&Context::seeded(0), "relu1", Neuron::Relu, Shape::flat(1, 4));
        let input = Matrix::column(&[-1.0, 0.0, 2.0, 3.0]);
        let mut output = Matrix::zeros(4, 1);
        layer.forward(&input, &mut output);
        assert_eq!(output.data, vec![0.0, 0.0, 2.0, 3.0]);

        let mut in_grad = Matrix::zeros(4, 1);
        layer.backward(&Matrix::filled(4, 1, 5.0), &output, &mut in_grad);
        assert_eq!(in_grad.data, vec![0.0, 0.0, 5.0, 5.0]);
    }
}
