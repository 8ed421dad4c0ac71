use serde::{Serialize, Deserialize};

use crate::engine::{Context, PoolGeometry};
use crate::error::{Result, StriateError};
use crate::math::{Matrix, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolParams {
    pub pool_size: usize,
    pub stride: usize,
    pub start: usize,
}

impl Default for PoolParams {
    fn default() -> Self {
        PoolParams { pool_size: 2, stride: 2, start: 0 }
    }
}

/// `ceil((img_size - pool_size - start) / stride) + 1`
pub fn pool_output_size(img_size: usize, pool_size: usize, start: usize, stride: usize) -> usize {
    (img_size - pool_size - start).div_ceil(stride) + 1
}

/// Max pooling. No parameters.
#[derive(Debug)]
pub struct MaxPoolLayer {
    pub(crate) name: String,
    pub(crate) params: PoolParams,
    pub(crate) img_shape: Shape,
    output_size: usize,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
    ctx: Context,
}

impl MaxPoolLayer {
    pub fn new(ctx: &Context, name: &str, params: PoolParams, img_shape: Shape) -> Result<MaxPoolLayer> {
        let malformed = |reason: String| StriateError::MalformedRecord { layer: name.to_string(), reason };
        if img_shape.height != img_shape.width {
            return Err(malformed(format!("image must be square, got {}x{}", img_shape.height, img_shape.width)));
        }
        if params.stride == 0 || params.pool_size == 0 {
            return Err(malformed("poolSize and stride must be positive".into()));
        }
        if params.stride > params.pool_size {
            return Err(malformed(format!(
                "stride {} exceeds poolSize {}; trailing windows would be empty",
                params.stride, params.pool_size
            )));
        }
        if params.pool_size + params.start > img_shape.height {
            return Err(malformed(format!(
                "pool window {} at offset {} exceeds image size {}",
                params.pool_size, params.start, img_shape.height
            )));
        }
        Ok(MaxPoolLayer {
            name: name.to_string(),
            params,
            img_shape,
            output_size: pool_output_size(img_shape.height, params.pool_size, params.start, params.stride),
            output_shape: None,
            bprop_disabled: false,
            ctx: ctx.clone(),
        })
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn output_shape(&mut self) -> Shape {
        let shape = Shape::square(self.img_shape.batch, self.img_shape.channels, self.output_size);
        self.output_shape = Some(shape);
        shape
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        self.output_shape
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.img_shape = self.img_shape.with_batch(batch);
        self.output_shape = None;
    }

    fn geometry(&self) -> PoolGeometry {
        PoolGeometry {
            channels: self.img_shape.channels,
            img_size: self.img_shape.height,
            pool_size: self.params.pool_size,
            start: self.params.start,
            stride: self.params.stride,
            output_size: self.output_size,
        }
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        self.ctx.engine().max_pool(input, output, &self.geometry());
    }

    pub fn backward(&mut self, out_grad: &Matrix, input: &Matrix, output: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        self.ctx.engine().max_unpool(input, out_grad, output, in_grad, &self.geometry());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_size_uses_ceiling_division() {
        assert_eq!(pool_output_size(4, 2, 0, 2), 2);
        assert_eq!(pool_output_size(5, 2, 0, 2), 3);
        assert_eq!(pool_output_size(24, 3, 0, 2), 12);
        assert_eq!(pool_output_size(32, 3, 0, 2), 16);
        assert_eq!(pool_output_size(6, 3, 1, 1), 3);
    }

    #[test]
    fn rejects_stride_wider_than_window() {
        let params = PoolParams { pool_size: 1, stride: 3, start: 0 };
        let err = MaxPoolLayer::new(&Context::seeded(0), "pool", params, Shape::square(1, 1, 5)).unwrap_err();
        assert!(matches!(err, StriateError::MalformedRecord { ref layer, .. } if layer == "pool"));

        let params = PoolParams { pool_size: 3, stride: 3, start: 0 };
        let mut pool = MaxPoolLayer::new(&Context::seeded(0), "pool", params, Shape::square(1, 1, 5)).unwrap();
        let input = Matrix::from_vec(25, 1, (0..25).map(|v| v as f32).collect());
        let mut output = Matrix::zeros(4, 1);
        pool.forward(&input, &mut output);
        assert_eq!(output.data, vec![12., 14., 22., 24.]);
    }

    #[test]
    fn forward_takes_window_max() {
        let mut pool = MaxPoolLayer::new(&Context::seeded(0), "pool", PoolParams::default(), Shape::square(1, 2, 4)).unwrap();
        let input = Matrix::from_vec(32, 1, vec![
            1., 3., 2., 1.,
            4., 2., 1., 5.,
            3., 1., 4., 2.,
            8., 6., 7., 9.,

            6., 4., 3., 8.,
            2., 4., 3., 7.,
            1., 5., 4., 3.,
            4., 7., 6., 4.,
        ]);
        let mut output = Matrix::zeros(8, 1);
        pool.forward(&input, &mut output);
        assert_eq!(output.data, vec![4., 5., 8., 9., 6., 8., 7., 6.]);
        assert_eq!(pool.output_shape(), Shape::square(1, 2, 2));
    }
}
