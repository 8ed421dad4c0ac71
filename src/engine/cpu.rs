use crate::math::matrix::Matrix;
use crate::neuron::Neuron;

use super::{ComputeEngine, ConvGeometry, NormGeometry, PoolGeometry};

/// Reference implementation of the engine on the host.
///
/// Loops are ordered so the innermost one runs along a matrix row, i.e. over
/// the batch, which is the contiguous axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuEngine;

#[inline]
fn axpy(y: &mut [f32], a: f32, x: &[f32]) {
    for (y, &x) in y.iter_mut().zip(x.iter()) {
        *y += a * x;
    }
}

#[inline]
fn row(m: &Matrix, r: usize) -> &[f32] {
    &m.data[r * m.cols..(r + 1) * m.cols]
}

#[inline]
fn row_mut(m: &mut Matrix, r: usize) -> &mut [f32] {
    let cols = m.cols;
    &mut m.data[r * cols..(r + 1) * cols]
}

impl ConvGeometry {
    /// Input coordinate touched by filter tap `k` at output position `o`.
    #[inline]
    fn source(&self, o: usize, k: usize) -> Option<usize> {
        let pos = (o * self.stride + k) as isize - self.padding as isize;
        if pos >= 0 && (pos as usize) < self.img_size {
            Some(pos as usize)
        } else {
            None
        }
    }

    /// Calls `f(output_row, input_row, filter_row)` for every valid tap.
    fn for_each_tap<F: FnMut(usize, usize, usize)>(&self, mut f: F) {
        let img_px = self.img_size * self.img_size;
        let out_px = self.output_size * self.output_size;
        let taps = self.filter_size * self.filter_size;
        for filter in 0..self.num_filter {
            for oy in 0..self.output_size {
                for ox in 0..self.output_size {
                    let out_row = filter * out_px + oy * self.output_size + ox;
                    for fy in 0..self.filter_size {
                        let Some(y) = self.source(oy, fy) else { continue };
                        for fx in 0..self.filter_size {
                            let Some(x) = self.source(ox, fx) else { continue };
                            for c in 0..self.channels {
                                let in_row = c * img_px + y * self.img_size + x;
                                let filter_row = c * taps + fy * self.filter_size + fx;
                                f(out_row, in_row, filter_row * self.num_filter + filter);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl PoolGeometry {
    /// Half-open input range covered by output index `o`, clipped to the image.
    #[inline]
    fn window(&self, o: usize) -> (usize, usize) {
        let lo = self.start + o * self.stride;
        (lo.min(self.img_size), (lo + self.pool_size).min(self.img_size))
    }
}

impl NormGeometry {
    /// Half-open channel range normalizing channel `c`.
    #[inline]
    fn window(&self, c: usize) -> (usize, usize) {
        let lo = c as isize - (self.size / 2) as isize;
        let hi = lo + self.size as isize;
        (lo.max(0) as usize, (hi.max(0) as usize).min(self.channels))
    }
}

impl ComputeEngine for CpuEngine {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn conv_forward(&self, input: &Matrix, filters: &Matrix, output: &mut Matrix, geom: &ConvGeometry) {
        assert_eq!(input.rows, geom.channels * geom.img_size * geom.img_size, "conv input rows");
        assert_eq!(output.rows, geom.num_filter * geom.output_size * geom.output_size, "conv output rows");
        assert_eq!(input.cols, output.cols, "conv batch mismatch");
        output.fill(0.0);
        geom.for_each_tap(|out_row, in_row, w| {
            axpy(row_mut(output, out_row), filters.data[w], row(input, in_row));
        });
    }

    fn conv_input_grad(&self, out_grad: &Matrix, filters: &Matrix, in_grad: &mut Matrix, geom: &ConvGeometry) {
        assert_eq!(in_grad.rows, geom.channels * geom.img_size * geom.img_size, "conv input gradient rows");
        assert_eq!(out_grad.cols, in_grad.cols, "conv batch mismatch");
        in_grad.fill(0.0);
        geom.for_each_tap(|out_row, in_row, w| {
            axpy(row_mut(in_grad, in_row), filters.data[w], row(out_grad, out_row));
        });
    }

    fn conv_weight_grad(&self, input: &Matrix, out_grad: &Matrix, filter_grad: &mut Matrix, geom: &ConvGeometry) {
        assert_eq!(input.cols, out_grad.cols, "conv batch mismatch");
        geom.for_each_tap(|out_row, in_row, w| {
            let dot: f32 = row(input, in_row)
                .iter()
                .zip(row(out_grad, out_row).iter())
                .map(|(a, b)| a * b)
                .sum();
            filter_grad.data[w] += dot;
        });
    }

    fn max_pool(&self, input: &Matrix, output: &mut Matrix, geom: &PoolGeometry) {
        let img_px = geom.img_size * geom.img_size;
        let out_px = geom.output_size * geom.output_size;
        assert_eq!(input.rows, geom.channels * img_px, "pool input rows");
        assert_eq!(output.rows, geom.channels * out_px, "pool output rows");
        output.fill(f32::NEG_INFINITY);
        for c in 0..geom.channels {
            for oy in 0..geom.output_size {
                let (y0, y1) = geom.window(oy);
                for ox in 0..geom.output_size {
                    let (x0, x1) = geom.window(ox);
                    let out_row = c * out_px + oy * geom.output_size + ox;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            let src = row(input, c * img_px + y * geom.img_size + x);
                            for (o, &v) in row_mut(output, out_row).iter_mut().zip(src.iter()) {
                                if v > *o {
                                    *o = v;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn max_unpool(
        &self,
        input: &Matrix,
        out_grad: &Matrix,
        output: &Matrix,
        in_grad: &mut Matrix,
        geom: &PoolGeometry,
    ) {
        let img_px = geom.img_size * geom.img_size;
        let out_px = geom.output_size * geom.output_size;
        in_grad.fill(0.0);
        for c in 0..geom.channels {
            for oy in 0..geom.output_size {
                let (y0, y1) = geom.window(oy);
                for ox in 0..geom.output_size {
                    let (x0, x1) = geom.window(ox);
                    let out_row = c * out_px + oy * geom.output_size + ox;
                    let maxes = row(output, out_row);
                    let grads = row(out_grad, out_row);
                    for y in y0..y1 {
                        for x in x0..x1 {
                            let in_row = c * img_px + y * geom.img_size + x;
                            let cols = input.cols;
                            for n in 0..cols {
                                if input.data[in_row * cols + n] == maxes[n] {
                                    in_grad.data[in_row * cols + n] += grads[n];
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn response_norm(&self, input: &Matrix, denom: &mut Matrix, output: &mut Matrix, geom: &NormGeometry) {
        assert_eq!(input.rows, geom.channels * geom.pixels, "rnorm input rows");
        assert_eq!(input.shape(), output.shape(), "rnorm output shape");
        assert_eq!(input.shape(), denom.shape(), "rnorm denominator shape");
        denom.fill(0.0);
        for c in 0..geom.channels {
            let (lo, hi) = geom.window(c);
            for p in 0..geom.pixels {
                let target = c * geom.pixels + p;
                for k in lo..hi {
                    let src = k * geom.pixels + p;
                    for n in 0..input.cols {
                        let x = input.data[src * input.cols + n];
                        denom.data[target * input.cols + n] += x * x;
                    }
                }
            }
        }
        for ((d, o), &x) in denom.data.iter_mut().zip(output.data.iter_mut()).zip(input.data.iter()) {
            *d = 1.0 + geom.scale * *d;
            *o = x * d.powf(-geom.pow);
        }
    }

    fn response_norm_grad(
        &self,
        out_grad: &Matrix,
        denom: &Matrix,
        input: &Matrix,
        output: &Matrix,
        in_grad: &mut Matrix,
        geom: &NormGeometry,
    ) {
        assert_eq!(out_grad.shape(), in_grad.shape(), "rnorm gradient shape");
        let cols = input.cols;
        // acc[j] = sum over the channels i whose window contains j of g[i] * out[i] / denom[i]
        let mut acc = Matrix::zeros(input.rows, cols);
        for c in 0..geom.channels {
            let (lo, hi) = geom.window(c);
            for p in 0..geom.pixels {
                let i = c * geom.pixels + p;
                for k in lo..hi {
                    let j = k * geom.pixels + p;
                    for n in 0..cols {
                        let at = i * cols + n;
                        acc.data[j * cols + n] += out_grad.data[at] * output.data[at] / denom.data[at];
                    }
                }
            }
        }
        let coeff = 2.0 * geom.pow * geom.scale;
        for (idx, g) in in_grad.data.iter_mut().enumerate() {
            *g = out_grad.data[idx] * denom.data[idx].powf(-geom.pow) - coeff * input.data[idx] * acc.data[idx];
        }
    }

    fn activate(&self, neuron: &Neuron, input: &Matrix, output: &mut Matrix) {
        assert_eq!(input.shape(), output.shape(), "activation shape");
        for (o, &x) in output.data.iter_mut().zip(input.data.iter()) {
            *o = neuron.function(x);
        }
    }

    fn activation_grad(&self, neuron: &Neuron, out_grad: &Matrix, output: &Matrix, in_grad: &mut Matrix) {
        assert_eq!(out_grad.shape(), in_grad.shape(), "activation gradient shape");
        for ((g, &dy), &y) in in_grad.data.iter_mut().zip(out_grad.data.iter()).zip(output.data.iter()) {
            *g = dy * neuron.derivative_from_output(y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_geom(img_size: usize, pool_size: usize, stride: usize, output_size: usize) -> PoolGeometry {
        PoolGeometry { channels: 1, img_size, pool_size, start: 0, stride, output_size }
    }

    #[test]
    fn conv_identity_filter_copies_input() {
        let geom = ConvGeometry {
            channels: 1, img_size: 3, num_filter: 1, filter_size: 1, padding: 0, stride: 1, output_size: 3,
        };
        let input = Matrix::from_vec(9, 1, (1..=9).map(|v| v as f32).collect());
        let filters = Matrix::from_vec(1, 1, vec![2.0]);
        let mut output = Matrix::zeros(9, 1);
        CpuEngine.conv_forward(&input, &filters, &mut output, &geom);
        assert_eq!(output.data, input.data.iter().map(|v| v * 2.0).collect::<Vec<_>>());
    }

    #[test]
    fn conv_padding_sees_zeros() {
        // 1x1 image, 3x3 all-ones filter, padding 1: only the centre tap is valid
        let geom = ConvGeometry {
            channels: 1, img_size: 1, num_filter: 1, filter_size: 3, padding: 1, stride: 1, output_size: 1,
        };
        let input = Matrix::from_vec(1, 2, vec![3.0, -1.0]);
        let filters = Matrix::filled(9, 1, 1.0);
        let mut output = Matrix::zeros(1, 2);
        CpuEngine.conv_forward(&input, &filters, &mut output, &geom);
        assert_eq!(output.data, vec![3.0, -1.0]);
    }

    #[test]
    fn pool_clips_partial_windows() {
        // 3 wide, window 2, stride 2: windows [0,2) and [2,3)
        let geom = pool_geom(3, 2, 2, 2);
        let input = Matrix::from_vec(9, 1, vec![
            1., 2., 9.,
            4., 3., 1.,
            7., 8., 0.,
        ]);
        let mut output = Matrix::zeros(4, 1);
        CpuEngine.max_pool(&input, &mut output, &geom);
        assert_eq!(output.data, vec![4., 9., 8., 0.]);
    }

    #[test]
    fn unpool_gives_every_tied_max_the_full_gradient() {
        let geom = pool_geom(2, 2, 2, 1);
        let input = Matrix::from_vec(4, 1, vec![5., 1., 5., 2.]);
        let mut output = Matrix::zeros(1, 1);
        CpuEngine.max_pool(&input, &mut output, &geom);
        let mut in_grad = Matrix::zeros(4, 1);
        CpuEngine.max_unpool(&input, &Matrix::filled(1, 1, 3.0), &output, &mut in_grad, &geom);
        assert_eq!(in_grad.data, vec![3., 0., 3., 0.]);
    }

    #[test]
    fn norm_window_is_clipped() {
        let geom = NormGeometry { channels: 4, pixels: 1, size: 3, scale: 1.0, pow: 1.0 };
        assert_eq!(geom.window(0), (0, 2));
        assert_eq!(geom.window(2), (1, 4));
        assert_eq!(geom.window(3), (2, 4));
    }
}
