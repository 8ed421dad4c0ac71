use serde::{Serialize, Deserialize};

use crate::error::{Result, StriateError};

/// Element-wise activation held by a `NeuronLayer`.
///
/// Serialized as `{"type": "relu"}` or `{"type": "tanh", "a": .., "b": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Neuron {
    Relu,
    /// `a * tanh(b * x)`
    Tanh { a: f32, b: f32 },
}

impl Neuron {
    pub fn kind(&self) -> &'static str {
        match self {
            Neuron::Relu => "relu",
            Neuron::Tanh { .. } => "tanh",
        }
    }

    /// Resolves a neuron from its checkpoint type string. `a` and `b` are
    /// only read for tanh.
    pub fn from_kind(kind: &str, a: Option<f32>, b: Option<f32>) -> Result<Neuron> {
        match kind {
            "relu" => Ok(Neuron::Relu),
            "tanh" => Ok(Neuron::Tanh { a: a.unwrap_or(0.0), b: b.unwrap_or(0.0) }),
            other => Err(StriateError::UnknownNeuron(other.to_string())),
        }
    }

    pub fn function(&self, x: f32) -> f32 {
        match *self {
            Neuron::Relu => if x > 0.0 { x } else { 0.0 },
            Neuron::Tanh { a, b } => a * (b * x).tanh(),
        }
    }

    /// Derivative at the input that produced `y = function(x)`.
    pub fn derivative_from_output(&self, y: f32) -> f32 {
        match *self {
            Neuron::Relu => if y > 0.0 { 1.0 } else { 0.0 },
            // d/dx a*tanh(bx) = a*b*(1 - tanh^2) = b*(a^2 - y^2)/a
            Neuron::Tanh { a, b } => {
                if a == 0.0 { 0.0 } else { b * (a * a - y * y) / a }
            }
        }
    }
}
