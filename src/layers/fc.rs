use serde::{Serialize, Deserialize};

use crate::engine::Context;
use crate::error::{Result, StriateError};
use crate::math::{Matrix, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FcParams {
    pub output_size: usize,
    pub init_w: f32,
    pub init_b: f32,
    pub eps_w: f32,
    pub eps_b: f32,
}

impl Default for FcParams {
    fn default() -> Self {
        FcParams { output_size: 10, init_w: 0.01, init_b: 0.0, eps_w: 0.001, eps_b: 0.002 }
    }
}

/// Fully connected layer: `output = weight * input + bias`.
#[derive(Debug)]
pub struct FcLayer {
    pub(crate) name: String,
    pub(crate) params: FcParams,
    pub(crate) input_size: usize,
    pub(crate) batch_size: usize,
    /// `(output_size, input_size)`
    pub(crate) weight: Matrix,
    /// `(output_size, 1)`
    pub(crate) bias: Matrix,
    weight_grad: Matrix,
    bias_grad: Matrix,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
}

impl FcLayer {
    /// `input_shape` is `(input_size, batch_size)`.
    pub fn new(ctx: &Context, name: &str, params: FcParams, input_shape: (usize, usize)) -> FcLayer {
        let weight = ctx.randn(params.output_size, input_shape.0, params.init_w);
        let bias = ctx.randn(params.output_size, 1, params.init_b);
        FcLayer::build(name, params, input_shape, weight, bias)
    }

    pub fn with_parameters(
        name: &str,
        params: FcParams,
        input_shape: (usize, usize),
        weight: Matrix,
        bias: Matrix,
    ) -> Result<FcLayer> {
        let expected = (params.output_size, input_shape.0);
        if weight.shape() != expected {
            return Err(StriateError::MalformedRecord {
                layer: name.to_string(),
                reason: format!("weight is {:?}, expected {:?}", weight.shape(), expected),
            });
        }
        if bias.data.len() != params.output_size {
            return Err(StriateError::MalformedRecord {
                layer: name.to_string(),
                reason: format!("bias has {} entries, expected {}", bias.data.len(), params.output_size),
            });
        }
        let bias = bias.reshape(params.output_size, 1);
        Ok(FcLayer::build(name, params, input_shape, weight, bias))
    }

    fn build(name: &str, params: FcParams, input_shape: (usize, usize), weight: Matrix, bias: Matrix) -> FcLayer {
        FcLayer {
            name: name.to_string(),
            params,
            input_size: input_shape.0,
            batch_size: input_shape.1,
            weight_grad: Matrix::zeros(weight.rows, weight.cols),
            bias_grad: Matrix::zeros(bias.rows, 1),
            weight,
            bias,
            output_shape: None,
            bprop_disabled: false,
        }
    }

    pub fn params(&self) -> &FcParams {
        &self.params
    }

    pub fn input_shape(&self) -> (usize, usize) {
        (self.input_size, self.batch_size)
    }

    pub fn weight(&self) -> &Matrix {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Matrix {
        &mut self.weight
    }

    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    pub fn weight_grad(&self) -> &Matrix {
        &self.weight_grad
    }

    pub fn bias_grad(&self) -> &Matrix {
        &self.bias_grad
    }

    pub fn output_shape(&mut self) -> Shape {
        let shape = Shape::flat(self.batch_size, self.params.output_size);
        self.output_shape = Some(shape);
        shape
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        self.output_shape
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.batch_size = batch;
        self.output_shape = None;
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        assert_eq!(input.rows, self.input_size, "fc '{}' expects {} input features", self.name, self.input_size);
        output.copy_from(&self.weight.dot(input));
        output.add_vec_to_rows(&self.bias);
    }

    pub fn backward(&mut self, out_grad: &Matrix, input: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        in_grad.copy_from(&self.weight.transpose().dot(out_grad));
        self.weight_grad = out_grad.dot(&input.transpose());
        out_grad.add_row_sum_to(&mut self.bias_grad, 0.0);
    }

    pub fn update(&mut self) {
        let batch = self.batch_size as f32;
        self.weight.add_scaled(&self.weight_grad, 1.0, self.params.eps_w / batch);
        self.bias.add_scaled(&self.bias_grad, 1.0, self.params.eps_b / batch);
    }

    pub fn scale_learning_rate(&mut self, factor: f32) {
        self.params.eps_w *= factor;
        self.params.eps_b *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_is_affine_per_column() {
        let params = FcParams { output_size: 2, ..FcParams::default() };
        let weight = Matrix::from_vec(2, 3, vec![1., 0., 2., -1., 1., 0.]);
        let bias = Matrix::column(&[0.5, -0.5]);
        let mut fc = FcLayer::with_parameters("fc", params, (3, 2), weight, bias).unwrap();
        let input = Matrix::from_vec(3, 2, vec![1., 2., 3., 4., 5., 6.]);
        let mut output = Matrix::zeros(2, 2);
        fc.forward(&input, &mut output);
        // column 0: x = (1, 3, 5), column 1: x = (2, 4, 6)
        assert_eq!(output.data, vec![11.5, 14.5, 1.5, 1.5]);
    }

    #[test]
    fn weight_grad_replaces_previous_value() {
        let params = FcParams { output_size: 1, ..FcParams::default() };
        let mut fc = FcLayer::with_parameters("fc", params, (2, 1), Matrix::zeros(1, 2), Matrix::zeros(1, 1)).unwrap();
        let input = Matrix::column(&[1.0, 2.0]);
        let out_grad = Matrix::column(&[3.0]);
        let mut in_grad = Matrix::zeros(2, 1);
        fc.backward(&out_grad, &input, &mut in_grad);
        fc.backward(&out_grad, &input, &mut in_grad);
        assert_eq!(fc.weight_grad().data, vec![3.0, 6.0]);
        assert_eq!(fc.bias_grad().data, vec![3.0]);
    }
}
