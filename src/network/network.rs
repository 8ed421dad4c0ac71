use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::engine::Context;
use crate::error::{Result, StriateError};
use crate::layers::{Layer, LegacyLayerRecord};
use crate::math::{Matrix, Shape};
use crate::network::spec::NetworkSpec;
use crate::train::history::BatchStats;

/// Persisted form of a network: one record per layer, in order.
///
/// Records are kept as JSON values so both checkpoint schemas load through
/// the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCheckpoint {
    pub input_shape: Shape,
    pub layers: Vec<Value>,
}

/// A chain of layers ending in a softmax, plus the per-layer activation and
/// gradient buffers for one batch.
#[derive(Debug)]
pub struct Network {
    layers: Vec<Layer>,
    input_shape: Shape,
    /// `outputs[i]` is the output of layer `i`.
    outputs: Vec<Matrix>,
    /// `grads[i]` is the gradient with respect to the input of layer `i`.
    grads: Vec<Matrix>,
}

impl Network {
    pub fn new(layers: Vec<Layer>, input_shape: Shape) -> Result<Network> {
        match layers.last() {
            Some(Layer::Softmax(_)) => {}
            _ => return Err(StriateError::MissingLossLayer),
        }
        let mut network = Network { layers, input_shape, outputs: vec![], grads: vec![] };
        network.allocate_buffers();
        Ok(network)
    }

    /// Builds every layer of `spec`, feeding each output shape into the next layer.
    pub fn from_spec(ctx: &Context, spec: &NetworkSpec) -> Result<Network> {
        let mut shape = spec.input_shape;
        let mut layers = Vec::with_capacity(spec.layers.len());
        for layer_spec in &spec.layers {
            let mut layer = layer_spec.build(ctx, shape)?;
            shape = layer.output_shape();
            layers.push(layer);
        }
        log::info!("built network '{}' with {} layers", spec.name, layers.len());
        Network::new(layers, spec.input_shape)
    }

    fn allocate_buffers(&mut self) {
        let mut shape = self.input_shape;
        self.outputs.clear();
        self.grads.clear();
        for layer in &mut self.layers {
            let out = layer.output_shape();
            log::debug!(
                "{} '{}': {:?} -> {:?}",
                layer.kind(),
                layer.name(),
                <[usize; 4]>::from(shape),
                <[usize; 4]>::from(out)
            );
            self.grads.push(Matrix::zeros(shape.features(), shape.batch));
            self.outputs.push(Matrix::zeros(out.features(), out.batch));
            shape = out;
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn batch_size(&self) -> usize {
        self.input_shape.batch
    }

    /// Class probabilities from the last forward pass.
    pub fn output(&self) -> &Matrix {
        &self.outputs[self.outputs.len() - 1]
    }

    /// Output of layer `index` from the last forward pass.
    pub fn layer_output(&self, index: usize) -> &Matrix {
        &self.outputs[index]
    }

    /// Gradient with respect to the input of layer `index` from the last backward pass.
    pub fn layer_input_grad(&self, index: usize) -> &Matrix {
        &self.grads[index]
    }

    /// Runs every layer in order.
    pub fn fprop(&mut self, data: &Matrix) {
        assert_eq!(
            data.shape(),
            (self.input_shape.features(), self.input_shape.batch),
            "data does not match the network input shape"
        );
        for i in 0..self.layers.len() {
            let (done, rest) = self.outputs.split_at_mut(i);
            let input = if i == 0 { data } else { &done[i - 1] };
            self.layers[i].forward(input, &mut rest[0]);
        }
    }

    /// Runs every layer in reverse, starting from the labels at the softmax.
    /// `data` must be the batch of the preceding `fprop`.
    pub fn bprop(&mut self, data: &Matrix, labels: &[usize]) -> Result<()> {
        let last = self.layers.len() - 1;
        let probs = &self.outputs[last];
        if let Layer::Softmax(softmax) = &mut self.layers[last] {
            softmax.backward_labels(labels, probs, &mut self.grads[last]);
        }
        for i in (0..last).rev() {
            let (lower, upper) = self.grads.split_at_mut(i + 1);
            let input = if i == 0 { data } else { &self.outputs[i - 1] };
            self.layers[i].backward(&upper[0], input, &self.outputs[i], &mut lower[i])?;
        }
        Ok(())
    }

    pub fn update(&mut self) {
        for layer in &mut self.layers {
            layer.update();
        }
    }

    /// Forward pass and cost only.
    pub fn evaluate(&mut self, data: &Matrix, labels: &[usize]) -> BatchStats {
        self.fprop(data);
        let last = self.outputs.len() - 1;
        let probs = &self.outputs[last];
        let batch = self.input_shape.batch;
        let softmax = match &mut self.layers[last] {
            Layer::Softmax(l) => l,
            _ => unreachable!("Network::new guarantees a softmax loss layer"),
        };
        softmax.compute_cost(labels, probs);
        BatchStats {
            cost: softmax.total_cost() as f64 / batch as f64,
            error: 1.0 - softmax.correct_rate() as f64,
            num_cases: batch,
        }
    }

    /// One step of minibatch gradient descent.
    pub fn train_batch(&mut self, data: &Matrix, labels: &[usize]) -> Result<BatchStats> {
        let stats = self.evaluate(data, labels);
        self.bprop(data, labels)?;
        self.update();
        log::debug!("batch cost {:.5} error {:.4}", stats.cost, stats.error);
        Ok(stats)
    }

    pub fn scale_learning_rate(&mut self, factor: f32) {
        for layer in &mut self.layers {
            layer.scale_learning_rate(factor);
        }
    }

    pub fn change_batch_size(&mut self, batch: usize) {
        self.input_shape = self.input_shape.with_batch(batch);
        for layer in &mut self.layers {
            layer.change_batch_size(batch);
        }
        self.allocate_buffers();
    }

    /// Correct-prediction count of the last `evaluate`.
    pub fn batch_correct(&self) -> usize {
        self.layers.last().and_then(Layer::as_softmax).map_or(0, |s| s.batch_correct())
    }

    pub fn checkpoint(&self) -> Result<NetworkCheckpoint> {
        let layers = self
            .layers
            .iter()
            .map(|l| serde_json::to_value(l.to_record()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(NetworkCheckpoint { input_shape: self.input_shape, layers })
    }

    /// Accepts native and legacy records; legacy records without an image
    /// shape take the output shape of the layer before them.
    pub fn from_checkpoint(ctx: &Context, checkpoint: NetworkCheckpoint) -> Result<Network> {
        let mut previous = Some(checkpoint.input_shape);
        let mut layers = Vec::with_capacity(checkpoint.layers.len());
        for value in checkpoint.layers {
            let mut layer = Layer::from_value(ctx, value, previous)?;
            previous = Some(layer.output_shape());
            layers.push(layer);
        }
        Network::new(layers, checkpoint.input_shape)
    }

    /// Rebuilds a network from legacy records alone, threading each layer's
    /// output shape into the next record that lacks an `imgShape`.
    pub fn from_legacy_records(ctx: &Context, input_shape: Shape, records: Vec<LegacyLayerRecord>) -> Result<Network> {
        let mut previous = Some(input_shape);
        let mut layers = Vec::with_capacity(records.len());
        for record in records {
            let mut layer = Layer::from_legacy_record(ctx, record, previous)?;
            previous = Some(layer.output_shape());
            layers.push(layer);
        }
        Network::new(layers, input_shape)
    }

    /// Serializes the network parameters to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.checkpoint()?)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json(ctx: &Context, path: &str) -> Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let checkpoint: NetworkCheckpoint = serde_json::from_reader(reader)?;
        Network::from_checkpoint(ctx, checkpoint)
    }
}
