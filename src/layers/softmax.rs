use crate::math::{Matrix, Shape};

/// Softmax output layer, doubling as the log-loss.
///
/// Its backward pass starts the gradient chain from labels rather than from
/// an output gradient.
#[derive(Debug)]
pub struct SoftmaxLayer {
    pub(crate) name: String,
    pub(crate) input_size: usize,
    pub(crate) batch_size: usize,
    /// Per-column max and sum, reused across calls.
    max_buf: Matrix,
    sum_buf: Matrix,
    /// `-ln p(label)` per batch element from the last `compute_cost`.
    cost: Matrix,
    batch_correct: usize,
    output_shape: Option<Shape>,
    pub(crate) bprop_disabled: bool,
}

impl SoftmaxLayer {
    /// `input_shape` is `(input_size, batch_size)`.
    pub fn new(name: &str, input_shape: (usize, usize)) -> SoftmaxLayer {
        let (input_size, batch_size) = input_shape;
        SoftmaxLayer {
            name: name.to_string(),
            input_size,
            batch_size,
            max_buf: Matrix::zeros(1, batch_size),
            sum_buf: Matrix::zeros(1, batch_size),
            cost: Matrix::zeros(batch_size, 1),
            batch_correct: 0,
            output_shape: None,
            bprop_disabled: false,
        }
    }

    pub fn input_shape(&self) -> (usize, usize) {
        (self.input_size, self.batch_size)
    }

    pub fn output_shape(&mut self) -> Shape {
        let shape = Shape::flat(self.batch_size, self.input_size);
        self.output_shape = Some(shape);
        shape
    }

    pub fn cached_output_shape(&self) -> Option<Shape> {
        self.output_shape
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.batch_size = batch;
        self.max_buf = Matrix::zeros(1, batch);
        self.sum_buf = Matrix::zeros(1, batch);
        self.cost = Matrix::zeros(batch, 1);
        self.output_shape = None;
    }

    pub fn forward(&mut self, input: &Matrix, output: &mut Matrix) {
        assert_eq!(input.shape(), (self.input_size, self.batch_size), "softmax '{}' input shape", self.name);
        input.col_max_into(&mut self.max_buf);
        output.copy_from(input);
        output.add_vec_to_cols(&self.max_buf, -1.0);
        output.map_inplace(f32::exp);
        output.add_col_sum_to(&mut self.sum_buf, 0.0);
        output.div_vec_to_cols(&self.sum_buf);
    }

    /// Records the per-element log-loss and the number of arg-max hits.
    pub fn compute_cost(&mut self, labels: &[usize], output: &Matrix) {
        assert_eq!(labels.len(), self.batch_size, "one label per batch element");
        let mut correct = 0;
        for (n, &label) in labels.iter().enumerate() {
            if output.col_argmax(n) == label {
                correct += 1;
            }
            self.cost.data[n] = -output.get(label, n).ln();
        }
        self.batch_correct = correct;
    }

    pub fn cost(&self) -> &Matrix {
        &self.cost
    }

    /// Summed log-loss of the last `compute_cost`.
    pub fn total_cost(&self) -> f32 {
        self.cost.sum()
    }

    pub fn batch_correct(&self) -> usize {
        self.batch_correct
    }

    pub fn correct_rate(&self) -> f32 {
        self.batch_correct as f32 / self.batch_size as f32
    }

    /// Writes `one_hot(label) - output`, the descent direction of the log-loss
    /// with respect to the softmax input.
    pub fn backward_labels(&mut self, labels: &[usize], output: &Matrix, in_grad: &mut Matrix) {
        if self.bprop_disabled {
            return;
        }
        assert_eq!(labels.len(), output.cols, "one label per batch element");
        for (g, &p) in in_grad.data.iter_mut().zip(output.data.iter()) {
            *g = -p;
        }
        for (n, &label) in labels.iter().enumerate() {
            let at = label * output.cols + n;
            in_grad.data[at] += 1.0;
        }
    }
}
