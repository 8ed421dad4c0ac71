use approx::{assert_abs_diff_eq, assert_relative_eq};

use striate::layers::conv::conv_output_size;
use striate::layers::{ConvLayer, ConvParams, FcLayer, FcParams, MaxPoolLayer, NormParams, PoolParams, ResponseNormLayer, SoftmaxLayer};
use striate::{Context, Matrix, Shape};

/// `sum(output * weights)` in f64, the scalar every finite-difference check differentiates.
fn weighted_sum(output: &Matrix, weights: &Matrix) -> f64 {
    output.data.iter().zip(weights.data.iter()).map(|(&o, &w)| o as f64 * w as f64).sum()
}

fn perturbed(m: &Matrix, index: usize, delta: f32) -> Matrix {
    let mut out = m.clone();
    out.data[index] += delta;
    out
}

#[test]
fn conv_output_shape_follows_formula() {
    let ctx = Context::seeded(1);
    for &(img, fs, pad, stride) in &[(32, 5, 2, 1), (24, 5, 0, 1), (9, 3, 1, 2), (12, 4, 0, 4)] {
        let params = ConvParams { num_filter: 3, filter_size: fs, padding: pad, stride, ..ConvParams::default() };
        let mut conv = ConvLayer::new(&ctx, "conv", params, Shape::square(2, 2, img)).unwrap();
        let expected = (2 * pad + img - fs) / stride + 1;
        assert_eq!(conv_output_size(img, fs, pad, stride), expected);
        assert_eq!(conv.output_shape(), Shape::new(2, 3, expected, expected));
    }
}

#[test]
fn conv_gradients_match_finite_differences() {
    let ctx = Context::seeded(21);
    let params = ConvParams { num_filter: 2, filter_size: 3, padding: 1, stride: 2, ..ConvParams::default() };
    let img = Shape::square(2, 2, 5);
    let mut conv = ConvLayer::new(&ctx, "conv", params, img).unwrap();
    let out_shape = conv.output_shape();

    let input = ctx.randn(img.features(), 2, 1.0);
    let weights = ctx.randn(out_shape.features(), 2, 1.0);
    let filter = ctx.randn(conv.filter().rows, conv.filter().cols, 0.5);
    let bias = ctx.randn(2, 1, 0.5);
    let mut conv = ConvLayer::with_parameters(&ctx, "conv", params, img, filter.clone(), bias.clone()).unwrap();

    let mut output = Matrix::zeros(out_shape.features(), 2);
    conv.forward(&input, &mut output);
    let mut in_grad = Matrix::zeros(img.features(), 2);
    conv.backward(&weights, &input, &mut in_grad);

    let h = 1e-2;
    let loss = |x: &Matrix, f: &Matrix, b: &Matrix| {
        let mut layer = ConvLayer::with_parameters(&ctx, "conv", params, img, f.clone(), b.clone()).unwrap();
        let mut out = Matrix::zeros(out_shape.features(), 2);
        layer.forward(x, &mut out);
        weighted_sum(&out, &weights)
    };

    for i in (0..input.data.len()).step_by(7) {
        let numeric = (loss(&perturbed(&input, i, h), &filter, &bias) - loss(&perturbed(&input, i, -h), &filter, &bias))
            / (2.0 * h as f64);
        assert_abs_diff_eq!(in_grad.data[i] as f64, numeric, epsilon = 1e-3);
    }
    for i in 0..filter.data.len() {
        let numeric = (loss(&input, &perturbed(&filter, i, h), &bias) - loss(&input, &perturbed(&filter, i, -h), &bias))
            / (2.0 * h as f64);
        assert_abs_diff_eq!(conv.filter_grad().data[i] as f64, numeric, epsilon = 1e-3);
    }
    for i in 0..bias.data.len() {
        let numeric = (loss(&input, &filter, &perturbed(&bias, i, h)) - loss(&input, &filter, &perturbed(&bias, i, -h)))
            / (2.0 * h as f64);
        assert_abs_diff_eq!(conv.bias_grad().data[i] as f64, numeric, epsilon = 1e-3);
    }
}

#[test]
fn max_pool_routes_gradient_only_to_window_max() {
    let ctx = Context::seeded(0);
    let img = Shape::square(1, 1, 4);
    let mut pool = MaxPoolLayer::new(&ctx, "pool", PoolParams { pool_size: 2, stride: 2, start: 0 }, img).unwrap();
    let input = Matrix::from_vec(16, 1, vec![
        1.0, 5.0, 2.0, 0.0,
        3.0, 4.0, 7.0, 1.0,
        0.0, 0.0, 9.0, 8.0,
        6.0, 2.0, 3.0, 4.0,
    ]);
    let mut output = Matrix::zeros(4, 1);
    pool.forward(&input, &mut output);
    assert_eq!(output.data, vec![5.0, 7.0, 6.0, 9.0]);

    let out_grad = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
    let mut in_grad = Matrix::filled(16, 1, -1.0);
    pool.backward(&out_grad, &input, &output, &mut in_grad);
    let mut expected = vec![0.0; 16];
    expected[1] = 1.0;
    expected[6] = 2.0;
    expected[12] = 3.0;
    expected[10] = 4.0;
    assert_eq!(in_grad.data, expected);
}

#[test]
fn response_norm_input_grad_matches_finite_differences() {
    let ctx = Context::seeded(5);
    let img = Shape::square(2, 4, 2);
    let params = NormParams { pow: 0.75, size: 3, scale: 0.5 };
    let input = ctx.randn(img.features(), 2, 1.0);
    let weights = ctx.randn(img.features(), 2, 1.0);

    let mut norm = ResponseNormLayer::new(&ctx, "rnorm", params, img);
    let mut output = Matrix::zeros(img.features(), 2);
    norm.forward(&input, &mut output);
    let mut in_grad = Matrix::zeros(img.features(), 2);
    norm.backward(&weights, &input, &output, &mut in_grad);

    let h = 1e-2;
    let loss = |x: &Matrix| {
        let mut layer = ResponseNormLayer::new(&ctx, "rnorm", params, img);
        let mut out = Matrix::zeros(img.features(), 2);
        layer.forward(x, &mut out);
        weighted_sum(&out, &weights)
    };
    for i in 0..input.data.len() {
        let numeric = (loss(&perturbed(&input, i, h)) - loss(&perturbed(&input, i, -h))) / (2.0 * h as f64);
        assert_abs_diff_eq!(in_grad.data[i] as f64, numeric, epsilon = 5e-3);
    }
}

#[test]
fn fc_weight_grad_is_the_descent_direction_of_the_cost() {
    let ctx = Context::seeded(9);
    let params = FcParams { output_size: 3, ..FcParams::default() };
    let (inputs, batch) = (4, 5);
    let labels = [0, 2, 1, 1, 0];
    let input = ctx.randn(inputs, batch, 1.0);
    let weight = ctx.randn(3, inputs, 0.5);
    let bias = ctx.randn(3, 1, 0.5);

    let cost = |w: &Matrix| {
        let mut fc = FcLayer::with_parameters("fc", params, (inputs, batch), w.clone(), bias.clone()).unwrap();
        let mut softmax = SoftmaxLayer::new("probs", (3, batch));
        let mut logits = Matrix::zeros(3, batch);
        let mut probs = Matrix::zeros(3, batch);
        fc.forward(&input, &mut logits);
        softmax.forward(&logits, &mut probs);
        softmax.compute_cost(&labels, &probs);
        softmax.cost().data.iter().map(|&c| c as f64).sum::<f64>()
    };

    let mut fc = FcLayer::with_parameters("fc", params, (inputs, batch), weight.clone(), bias.clone()).unwrap();
    let mut softmax = SoftmaxLayer::new("probs", (3, batch));
    let mut logits = Matrix::zeros(3, batch);
    let mut probs = Matrix::zeros(3, batch);
    fc.forward(&input, &mut logits);
    softmax.forward(&logits, &mut probs);
    let mut logit_grad = Matrix::zeros(3, batch);
    softmax.backward_labels(&labels, &probs, &mut logit_grad);
    let mut in_grad = Matrix::zeros(inputs, batch);
    fc.backward(&logit_grad, &input, &mut in_grad);

    let h = 1e-2;
    for i in 0..weight.data.len() {
        let numeric = (cost(&perturbed(&weight, i, h)) - cost(&perturbed(&weight, i, -h))) / (2.0 * h as f64);
        assert_abs_diff_eq!(-fc.weight_grad().data[i] as f64, numeric, epsilon = 2e-3);
    }
    let row_sums: Vec<f32> = (0..3).map(|r| (0..batch).map(|n| logit_grad.get(r, n)).sum()).collect();
    for (g, s) in fc.bias_grad().data.iter().zip(row_sums) {
        assert_relative_eq!(*g, s, epsilon = 1e-6);
    }
}

#[test]
fn softmax_columns_sum_to_one_and_count_hits() {
    let ctx = Context::seeded(13);
    let mut softmax = SoftmaxLayer::new("probs", (5, 4));
    let logits = ctx.randn(5, 4, 3.0);
    let mut probs = Matrix::zeros(5, 4);
    softmax.forward(&logits, &mut probs);
    for n in 0..4 {
        let total: f32 = (0..5).map(|r| probs.get(r, n)).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
    }

    let predicted: Vec<usize> = (0..4).map(|n| probs.col_argmax(n)).collect();
    let labels = [predicted[0], (predicted[1] + 1) % 5, predicted[2], (predicted[3] + 1) % 5];
    softmax.compute_cost(&labels, &probs);
    assert_eq!(softmax.batch_correct(), 2);
    assert_abs_diff_eq!(softmax.correct_rate(), 0.5);
    for (n, &label) in labels.iter().enumerate() {
        assert_abs_diff_eq!(softmax.cost().data[n], -probs.get(label, n).ln(), epsilon = 1e-6);
    }
}
