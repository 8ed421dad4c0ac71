use serde::{Serialize, Deserialize};

use crate::engine::{Context, ConvGeometry};
use crate::error::{Result, StriateError};
use crate::math::{Matrix, Shape};

/// Structural and learning hyperparameters of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvParams {
    pub num_filter: usize,
    pub filter_size: usize,
    pub padding: usize,
    pub stride: usize,
    pub init_w: f32,
    pub init_b: f32,
    pub eps_w: f32,
    pub eps_b: f32,
}

impl Default for ConvParams {
    fn default() -> Self {
        ConvParams {
            num_filter: 32,
            filter_size: 5,
            padding: 2,
            stride: 1,
            init_w: 0.01,
            init_b: 0.0,
            eps_w: 0.001,
            eps_b: 0.002,
        }
    }
}

/// `floor((2*padding + img_size - filter_size) / stride) + 1`
pub fn conv_output_size(img_size: usize, filter_size: usize, padding: usize, stride: usize) -> usize {
    (2 * padding + img_size - filter_size) / stride + 1
}

#[derive(Debug)]
pub struct ConvLayer {
    pub(crate) name: String,
    pub(crate) params: ConvParams,
    pub(crate) img_shape: Shape,
    output_size: usize,
    /// `(filter_size^2 * num_color, num_filter)`
    pub(crate) filter: Matrix,
    /// `(num_filter, 1)`
    pub(crate) bias: Matrix,
    filter_grad: Matrix,
    bias_grad: Matrix,
    /// `(num_filter, output_size^2 * batch)` view of an output-shaped buffer.
    bias_scratch: Matrix,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
    ctx: Context,
}

impl ConvLayer {
    /// Builds the layer with `randn * initW` filters and `randn * initB` biases.
    pub fn new(ctx: &Context, name: &str, params: ConvParams, img_shape: Shape) -> Result<ConvLayer> {
        let rows = params.filter_size * params.filter_size * img_shape.channels;
        let filter = ctx.randn(rows, params.num_filter, params.init_w);
        let bias = ctx.randn(params.num_filter, 1, params.init_b);
        ConvLayer::with_parameters(ctx, name, params, img_shape, filter, bias)
    }

    /// Builds the layer around existing parameters, e.g. from a checkpoint.
    pub fn with_parameters(
        ctx: &Context,
        name: &str,
        params: ConvParams,
        img_shape: Shape,
        filter: Matrix,
        bias: Matrix,
    ) -> Result<ConvLayer> {
        let malformed = |reason: String| StriateError::MalformedRecord { layer: name.to_string(), reason };
        if img_shape.height != img_shape.width {
            return Err(malformed(format!("image must be square, got {}x{}", img_shape.height, img_shape.width)));
        }
        if params.stride == 0 || params.filter_size == 0 || params.num_filter == 0 {
            return Err(malformed("stride, filterSize and numFilter must be positive".into()));
        }
        if params.filter_size > img_shape.height + 2 * params.padding {
            return Err(malformed(format!(
                "filter of size {} does not fit a padded image of size {}",
                params.filter_size,
                img_shape.height + 2 * params.padding
            )));
        }
        let rows = params.filter_size * params.filter_size * img_shape.channels;
        if filter.shape() != (rows, params.num_filter) {
            return Err(malformed(format!("filter is {:?}, expected {:?}", filter.shape(), (rows, params.num_filter))));
        }
        // both (numFilter, 1) and (1, numFilter) bias layouts exist in the wild
        if bias.data.len() != params.num_filter {
            return Err(malformed(format!("bias has {} entries, expected {}", bias.data.len(), params.num_filter)));
        }
        let bias = bias.reshape(params.num_filter, 1);

        let output_size = conv_output_size(img_shape.height, params.filter_size, params.padding, params.stride);
        let modules = output_size * output_size;
        Ok(ConvLayer {
            name: name.to_string(),
            params,
            img_shape,
            output_size,
            filter_grad: Matrix::zeros(filter.rows, filter.cols),
            bias_grad: Matrix::zeros(params.num_filter, 1),
            bias_scratch: Matrix::zeros(params.num_filter, modules * img_shape.batch),
            filter,
            bias,
            output_shape: None,
            bprop_disabled: false,
            ctx: ctx.clone(),
        })
    }

    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    pub fn filter(&self) -> &Matrix {
        &self.filter
    }

    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    pub fn filter_grad(&self) -> &Matrix {
        &self.filter_grad
    }

    pub fn bias_grad(&self) -> &Matrix {
        &self.bias_grad
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn output_shape(&mut self) -> Shape {
        let shape = Shape::square(self.img_shape.batch, self.params.num_filter, self.output_size);
        self.output_shape = Some(shape);
        shape
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        self.output_shape
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.img_shape = self.img_shape.with_batch(batch);
        self.bias_scratch = Matrix::zeros(self.params.num_filter, self.output_size * self.output_size * batch);
        self.output_shape = None;
    }

    fn geometry(&self) -> ConvGeometry {
        ConvGeometry {
            channels: self.img_shape.channels,
            img_size: self.img_shape.height,
            num_filter: self.params.num_filter,
            filter_size: self.params.filter_size,
            padding: self.params.padding,
            stride: self.params.stride,
            output_size: self.output_size,
        }
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        let geom = self.geometry();
        self.ctx.engine().conv_forward(input, &self.filter, output, &geom);

        // Output rows are filter-major, so the flat buffer reads as one row per filter.
        self.bias_scratch.copy_from(output);
        self.bias_scratch.add_vec_to_rows(&self.bias);
        output.copy_from(&self.bias_scratch);
    }

    pub fn backward(&mut self, out_grad: &Matrix, input: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        let geom = self.geometry();
        let engine = self.ctx.engine();
        engine.conv_input_grad(out_grad, &self.filter, in_grad, &geom);

        self.filter_grad.fill(0.0);
        engine.conv_weight_grad(input, out_grad, &mut self.filter_grad, &geom);

        self.bias_grad.fill(0.0);
        self.bias_scratch.copy_from(out_grad);
        self.bias_scratch.add_row_sum_to(&mut self.bias_grad, 1.0);
    }

    pub fn update(&mut self) {
        let batch = self.img_shape.batch as f32;
        self.filter.add_scaled(&self.filter_grad, 1.0, self.params.eps_w / batch);
        self.bias.add_scaled(&self.bias_grad, 1.0, self.params.eps_b / batch);
    }

    pub fn scale_learning_rate(&mut self, factor: f32) {
        self.params.eps_w *= factor;
        self.params.eps_b *= factor;
    }
}
