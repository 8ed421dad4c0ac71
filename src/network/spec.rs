use serde::{Serialize, Deserialize};

use crate::engine::Context;
use crate::error::Result;
use crate::layers::{
    ConvLayer, ConvParams, FcLayer, FcParams, Layer, MaxPoolLayer, NeuronLayer, NormParams, PoolParams,
    ResponseNormLayer, SoftmaxLayer,
};
use crate::math::Shape;
use crate::neuron::Neuron;

/// Hyperparameters of one layer, before shapes are known.
///
/// ```json
/// {"name": "conv1", "type": "conv", "numFilter": 16, "filterSize": 5, "padding": 2}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKindSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerKindSpec {
    Conv(ConvParams),
    Pool(PoolParams),
    Rnorm(NormParams),
    Fc(FcParams),
    Softmax,
    Neuron { neuron: Neuron },
}

impl LayerSpec {
    pub fn new(name: &str, kind: LayerKindSpec) -> LayerSpec {
        LayerSpec { name: name.to_string(), kind }
    }

    /// Instantiates the layer for an input of shape `input`.
    pub fn build(&self, ctx: &Context, input: Shape) -> Result<Layer> {
        let flat = (input.features(), input.batch);
        let layer = match &self.kind {
            LayerKindSpec::Conv(p) => ConvLayer::new(ctx, &self.name, *p, input)?.into(),
            LayerKindSpec::Pool(p) => MaxPoolLayer::new(ctx, &self.name, *p, input)?.into(),
            LayerKindSpec::Rnorm(p) => ResponseNormLayer::new(ctx, &self.name, *p, input).into(),
            LayerKindSpec::Fc(p) => FcLayer::new(ctx, &self.name, *p, flat).into(),
            LayerKindSpec::Softmax => SoftmaxLayer::new(&self.name, flat).into(),
            LayerKindSpec::Neuron { neuron } => NeuronLayer::new(ctx, &self.name, *neuron, input).into(),
        };
        Ok(layer)
    }
}

/// A serializable network architecture: input shape plus ordered layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub name: String,
    pub input_shape: Shape,
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flattened_layer_specs() {
        let json = r#"{
            "name": "tiny",
            "inputShape": [8, 3, 16, 16],
            "layers": [
                {"name": "conv1", "type": "conv", "numFilter": 4, "filterSize": 3, "padding": 1},
                {"name": "relu1", "type": "neuron", "neuron": {"type": "relu"}},
                {"name": "pool1", "type": "pool", "poolSize": 2, "stride": 2},
                {"name": "norm1", "type": "rnorm", "size": 3},
                {"name": "fc1", "type": "fc", "outputSize": 10},
                {"name": "probs", "type": "softmax"}
            ]
        }"#;
        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.input_shape, Shape::square(8, 3, 16));
        assert_eq!(spec.layers.len(), 6);
        let LayerKindSpec::Conv(conv) = &spec.layers[0].kind else { panic!("expected conv") };
        assert_eq!(conv.num_filter, 4);
        assert_eq!(conv.stride, 1);
        assert_eq!(spec.layers[1].kind, LayerKindSpec::Neuron { neuron: Neuron::Relu });
        assert_eq!(spec.layers[5].kind, LayerKindSpec::Softmax);
    }
}
