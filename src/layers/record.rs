//! Checkpoint records.
//!
//! Every kind writes an explicit field list; gradient buffers and scratch
//! never reach a record. Two schemas are read: the native one written by
//! [`Layer::to_record`], and the legacy cuda-convnet layout where several
//! hyperparameters are singleton lists, padding is stored negated and fully
//! connected weights are stored transposed.

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::engine::Context;
use crate::error::{Result, StriateError};
use crate::math::{Matrix, Shape};
use crate::neuron::Neuron;

use super::{
    ConvLayer, ConvParams, FcLayer, FcParams, Layer, MaxPoolLayer, NeuronLayer, NormParams, PoolParams,
    ResponseNormLayer, SoftmaxLayer,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerRecord {
    #[serde(rename = "conv")]
    Conv(ConvRecord),
    #[serde(rename = "pool")]
    Pool(PoolRecord),
    #[serde(rename = "rnorm")]
    ResponseNorm(NormRecord),
    #[serde(rename = "fc")]
    Fc(FcRecord),
    #[serde(rename = "softmax")]
    Softmax(SoftmaxRecord),
    #[serde(rename = "neuron")]
    Neuron(NeuronLayerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvRecord {
    pub name: String,
    pub num_filter: usize,
    pub filter_size: usize,
    pub num_color: usize,
    pub padding: usize,
    pub stride: usize,
    pub init_w: f32,
    pub init_b: f32,
    pub eps_w: f32,
    pub eps_b: f32,
    pub img_size: usize,
    pub img_shape: Shape,
    pub filter: Matrix,
    pub bias: Matrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRecord {
    pub name: String,
    pub pool_size: usize,
    pub stride: usize,
    pub start: usize,
    pub img_shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormRecord {
    pub name: String,
    pub pow: f32,
    pub size: usize,
    pub scale: f32,
    pub img_shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcRecord {
    pub name: String,
    /// `[input_size, batch_size]`
    pub input_shape: (usize, usize),
    pub output_size: usize,
    pub weight: Matrix,
    pub bias: Matrix,
    pub eps_w: f32,
    pub eps_b: f32,
    pub init_w: f32,
    pub init_b: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftmaxRecord {
    pub name: String,
    pub input_shape: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuronLayerRecord {
    pub name: String,
    pub img_shape: Shape,
    pub neuron: NeuronRecord,
}

/// Neuron as stored on disk. The kind stays a plain string until the record
/// is turned into a layer, so an unknown kind is reported by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f32>,
}

impl From<&Neuron> for NeuronRecord {
    fn from(neuron: &Neuron) -> Self {
        match *neuron {
            Neuron::Relu => NeuronRecord { kind: neuron.kind().to_string(), a: None, b: None },
            Neuron::Tanh { a, b } => NeuronRecord { kind: neuron.kind().to_string(), a: Some(a), b: Some(b) },
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LegacyLayerRecord {
    #[serde(rename = "conv")]
    Conv(LegacyConvRecord),
    #[serde(rename = "pool")]
    Pool(LegacyPoolRecord),
    #[serde(rename = "rnorm")]
    ResponseNorm(LegacyNormRecord),
    #[serde(rename = "fc")]
    Fc(LegacyFcRecord),
    #[serde(rename = "softmax")]
    Softmax(SoftmaxRecord),
    #[serde(rename = "neuron")]
    Neuron(LegacyNeuronLayerRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyConvRecord {
    pub name: String,
    pub filters: usize,
    pub filter_size: Vec<usize>,
    pub channels: Vec<usize>,
    /// Negated padding, i.e. the first input coordinate a filter touches.
    pub padding: Vec<i64>,
    pub stride: Vec<usize>,
    pub init_w: Vec<f32>,
    pub init_b: f32,
    pub eps_w: Vec<f32>,
    pub eps_b: f32,
    pub img_size: usize,
    pub biases: Matrix,
    pub weights: Vec<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_shape: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPoolRecord {
    pub name: String,
    #[serde(rename = "sizeX")]
    pub size_x: usize,
    pub stride: usize,
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_shape: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyNormRecord {
    pub name: String,
    pub pow: f32,
    pub size: usize,
    pub scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_shape: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFcRecord {
    pub name: String,
    pub input_shape: (usize, usize),
    pub outputs: usize,
    pub eps_w: Vec<f32>,
    pub eps_b: f32,
    pub init_w: Vec<f32>,
    pub init_b: f32,
    pub biases: Matrix,
    /// `[weight^T]`, i.e. `(input_size, output_size)`.
    pub weights: Vec<Matrix>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyNeuronLayerRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_shape: Option<Shape>,
    pub neuron: NeuronRecord,
}

/// First element of a singleton list field.
fn first<T: Clone>(values: &[T], layer: &str, field: &str) -> Result<T> {
    values.first().cloned().ok_or_else(|| StriateError::MalformedRecord {
        layer: layer.to_string(),
        reason: format!("'{field}' is an empty list"),
    })
}

fn image_shape(own: Option<Shape>, previous: Option<Shape>, layer: &str) -> Result<Shape> {
    own.or(previous).ok_or_else(|| StriateError::MalformedRecord {
        layer: layer.to_string(),
        reason: "no 'imgShape' and no preceding layer to take it from".into(),
    })
}

fn check_image(shape: Shape, channels: usize, size: usize, layer: &str) -> Result<()> {
    if shape.channels != channels || shape.height != size {
        return Err(StriateError::MalformedRecord {
            layer: layer.to_string(),
            reason: format!("imgShape {:?} disagrees with {} channels of size {}", <[usize; 4]>::from(shape), channels, size),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Layer <-> record
// ---------------------------------------------------------------------------

impl Layer {
    pub fn to_record(&self) -> LayerRecord {
        match self {
            Layer::Conv(l) => LayerRecord::Conv(ConvRecord {
                name: l.name.clone(),
                num_filter: l.params.num_filter,
                filter_size: l.params.filter_size,
                num_color: l.img_shape.channels,
                padding: l.params.padding,
                stride: l.params.stride,
                init_w: l.params.init_w,
                init_b: l.params.init_b,
                eps_w: l.params.eps_w,
                eps_b: l.params.eps_b,
                img_size: l.img_shape.height,
                img_shape: l.img_shape,
                filter: l.filter.clone(),
                bias: l.bias.clone(),
            }),
            Layer::MaxPool(l) => LayerRecord::Pool(PoolRecord {
                name: l.name.clone(),
                pool_size: l.params.pool_size,
                stride: l.params.stride,
                start: l.params.start,
                img_shape: l.img_shape,
            }),
            Layer::ResponseNorm(l) => LayerRecord::ResponseNorm(NormRecord {
                name: l.name.clone(),
                pow: l.params.pow,
                size: l.params.size,
                scale: l.params.scale,
                img_shape: l.img_shape,
            }),
            Layer::FullyConnected(l) => LayerRecord::Fc(FcRecord {
                name: l.name.clone(),
                input_shape: l.input_shape(),
                output_size: l.params.output_size,
                weight: l.weight.clone(),
                bias: l.bias.clone(),
                eps_w: l.params.eps_w,
                eps_b: l.params.eps_b,
                init_w: l.params.init_w,
                init_b: l.params.init_b,
            }),
            Layer::Softmax(l) => LayerRecord::Softmax(SoftmaxRecord {
                name: l.name.clone(),
                input_shape: l.input_shape(),
            }),
            Layer::Neuron(l) => LayerRecord::Neuron(NeuronLayerRecord {
                name: l.name.clone(),
                img_shape: l.img_shape,
                neuron: NeuronRecord::from(&l.neuron),
            }),
        }
    }

    pub fn to_legacy_record(&self) -> LegacyLayerRecord {
        match self.to_record() {
            LayerRecord::Conv(r) => LegacyLayerRecord::Conv(LegacyConvRecord {
                name: r.name,
                filters: r.num_filter,
                filter_size: vec![r.filter_size],
                channels: vec![r.num_color],
                padding: vec![-(r.padding as i64)],
                stride: vec![r.stride],
                init_w: vec![r.init_w],
                init_b: r.init_b,
                eps_w: vec![r.eps_w],
                eps_b: r.eps_b,
                img_size: r.img_size,
                biases: r.bias,
                weights: vec![r.filter],
                img_shape: Some(r.img_shape),
            }),
            LayerRecord::Pool(r) => LegacyLayerRecord::Pool(LegacyPoolRecord {
                name: r.name,
                size_x: r.pool_size,
                stride: r.stride,
                start: r.start,
                img_shape: Some(r.img_shape),
            }),
            LayerRecord::ResponseNorm(r) => LegacyLayerRecord::ResponseNorm(LegacyNormRecord {
                name: r.name,
                pow: r.pow,
                size: r.size,
                scale: r.scale,
                img_shape: Some(r.img_shape),
            }),
            LayerRecord::Fc(r) => LegacyLayerRecord::Fc(LegacyFcRecord {
                name: r.name,
                input_shape: r.input_shape,
                outputs: r.output_size,
                eps_w: vec![r.eps_w],
                eps_b: r.eps_b,
                init_w: vec![r.init_w],
                init_b: r.init_b,
                biases: r.bias,
                weights: vec![r.weight.transpose()],
            }),
            LayerRecord::Softmax(r) => LegacyLayerRecord::Softmax(r),
            LayerRecord::Neuron(r) => LegacyLayerRecord::Neuron(LegacyNeuronLayerRecord {
                name: r.name,
                img_shape: Some(r.img_shape),
                neuron: r.neuron,
            }),
        }
    }

    pub fn from_record(ctx: &Context, record: LayerRecord) -> Result<Layer> {
        let layer = match record {
            LayerRecord::Conv(r) => {
                check_image(r.img_shape, r.num_color, r.img_size, &r.name)?;
                let params = ConvParams {
                    num_filter: r.num_filter,
                    filter_size: r.filter_size,
                    padding: r.padding,
                    stride: r.stride,
                    init_w: r.init_w,
                    init_b: r.init_b,
                    eps_w: r.eps_w,
                    eps_b: r.eps_b,
                };
                ConvLayer::with_parameters(ctx, &r.name, params, r.img_shape, r.filter, r.bias)?.into()
            }
            LayerRecord::Pool(r) => {
                let params = PoolParams { pool_size: r.pool_size, stride: r.stride, start: r.start };
                MaxPoolLayer::new(ctx, &r.name, params, r.img_shape)?.into()
            }
            LayerRecord::ResponseNorm(r) => {
                let params = NormParams { pow: r.pow, size: r.size, scale: r.scale };
                ResponseNormLayer::new(ctx, &r.name, params, r.img_shape).into()
            }
            LayerRecord::Fc(r) => {
                let params = FcParams {
                    output_size: r.output_size,
                    init_w: r.init_w,
                    init_b: r.init_b,
                    eps_w: r.eps_w,
                    eps_b: r.eps_b,
                };
                FcLayer::with_parameters(&r.name, params, r.input_shape, r.weight, r.bias)?.into()
            }
            LayerRecord::Softmax(r) => SoftmaxLayer::new(&r.name, r.input_shape).into(),
            LayerRecord::Neuron(r) => {
                let neuron = Neuron::from_kind(&r.neuron.kind, r.neuron.a, r.neuron.b)?;
                NeuronLayer::new(ctx, &r.name, neuron, r.img_shape).into()
            }
        };
        Ok(layer)
    }

    /// Rebuilds a layer from a legacy record. `previous` is the output shape
    /// of the preceding layer, used when the record carries no `imgShape`.
    pub fn from_legacy_record(ctx: &Context, record: LegacyLayerRecord, previous: Option<Shape>) -> Result<Layer> {
        let native = match record {
            LegacyLayerRecord::Conv(r) => {
                let img_shape = image_shape(r.img_shape, previous, &r.name)?;
                let padding = -first(&r.padding, &r.name, "padding")?;
                if padding < 0 {
                    return Err(StriateError::MalformedRecord {
                        layer: r.name,
                        reason: format!("padding start {} is positive", -padding),
                    });
                }
                LayerRecord::Conv(ConvRecord {
                    num_filter: r.filters,
                    filter_size: first(&r.filter_size, &r.name, "filterSize")?,
                    num_color: first(&r.channels, &r.name, "channels")?,
                    padding: padding as usize,
                    stride: first(&r.stride, &r.name, "stride")?,
                    init_w: first(&r.init_w, &r.name, "initW")?,
                    init_b: r.init_b,
                    eps_w: first(&r.eps_w, &r.name, "epsW")?,
                    eps_b: r.eps_b,
                    img_size: r.img_size,
                    img_shape,
                    filter: first(&r.weights, &r.name, "weights")?,
                    bias: r.biases,
                    name: r.name,
                })
            }
            LegacyLayerRecord::Pool(r) => LayerRecord::Pool(PoolRecord {
                img_shape: image_shape(r.img_shape, previous, &r.name)?,
                pool_size: r.size_x,
                stride: r.stride,
                start: r.start,
                name: r.name,
            }),
            LegacyLayerRecord::ResponseNorm(r) => LayerRecord::ResponseNorm(NormRecord {
                img_shape: image_shape(r.img_shape, previous, &r.name)?,
                pow: r.pow,
                size: r.size,
                scale: r.scale,
                name: r.name,
            }),
            LegacyLayerRecord::Fc(r) => LayerRecord::Fc(FcRecord {
                input_shape: r.input_shape,
                output_size: r.outputs,
                weight: first(&r.weights, &r.name, "weights")?.transpose(),
                bias: r.biases,
                eps_w: first(&r.eps_w, &r.name, "epsW")?,
                eps_b: r.eps_b,
                init_w: first(&r.init_w, &r.name, "initW")?,
                init_b: r.init_b,
                name: r.name,
            }),
            LegacyLayerRecord::Softmax(r) => LayerRecord::Softmax(r),
            LegacyLayerRecord::Neuron(r) => LayerRecord::Neuron(NeuronLayerRecord {
                img_shape: image_shape(r.img_shape, previous, &r.name)?,
                neuron: r.neuron,
                name: r.name,
            }),
        };
        Layer::from_record(ctx, native)
    }

    /// Accepts a record in either schema. The native schema is tried first.
    pub fn from_value(ctx: &Context, value: Value, previous: Option<Shape>) -> Result<Layer> {
        match serde_json::from_value::<LayerRecord>(value.clone()) {
            Ok(record) => Layer::from_record(ctx, record),
            Err(native_err) => match serde_json::from_value::<LegacyLayerRecord>(value) {
                Ok(record) => Layer::from_legacy_record(ctx, record, previous),
                Err(_) => Err(native_err.into()),
            },
        }
    }
}
