use serde::{Serialize, Deserialize};

use crate::engine::{Context, NormGeometry};
use crate::math::{Matrix, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormParams {
    pub pow: f32,
    pub size: usize,
    pub scale: f32,
}

impl Default for NormParams {
    fn default() -> Self {
        NormParams { pow: 0.75, size: 9, scale: 0.001 }
    }
}

/// Local response normalization across neighbouring channels.
#[derive(Debug)]
pub struct ResponseNormLayer {
    pub(crate) name: String,
    pub(crate) params: NormParams,
    pub(crate) img_shape: Shape,
    /// Denominators from the last forward pass, shaped like the input.
    denom: Matrix,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
    ctx: Context,
}

impl ResponseNormLayer {
    pub fn new(ctx: &Context, name: &str, params: NormParams, img_shape: Shape) -> ResponseNormLayer {
        ResponseNormLayer {
            name: name.to_string(),
            params,
            img_shape,
            denom: Matrix::zeros(img_shape.features(), img_shape.batch),
            output_shape: None,
            bprop_disabled: false,
            ctx: ctx.clone(),
        }
    }

    pub fn params(&self) -> &NormParams {
        &self.params
    }

    pub fn denom(&self) -> &Matrix {
        &self.denom
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
        self.denom = Matrix::zeros(self.img_shape.features(), batch);
        self.output_shape = None;
    }

    fn geometry(&self) -> NormGeometry {
        NormGeometry {
            channels: self.img_shape.channels,
            pixels: self.img_shape.height * self.img_shape.width,
            size: self.params.size,
            scale: self.params.scale,
            pow: self.params.pow,
        }
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        let geom = self.geometry();
        self.ctx.engine().response_norm(input, &mut self.denom, output, &geom);
    }

    pub fn backward(&mut self, out_grad: &Matrix, input: &Matrix, output: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        let geom = self.geometry();
        self.ctx.engine().response_norm_grad(out_grad, &self.denom, input, output, in_grad, &geom);
    }
}
