use serde::{Serialize, Deserialize};

/// Shape of an image batch. Serialized as `[batch, channels, height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 4]", into = "[usize; 4]")]
pub struct Shape {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(batch: usize, channels: usize, height: usize, width: usize) -> Shape {
        Shape { batch, channels, height, width }
    }

    /// Square image of side `size`.
    pub fn square(batch: usize, channels: usize, size: usize) -> Shape {
        Shape::new(batch, channels, size, size)
    }

    /// Flat feature vector, as produced by fully connected layers.
    pub fn flat(batch: usize, features: usize) -> Shape {
        Shape::new(batch, features, 1, 1)
    }

    /// Values per batch element; the row count of the matrix holding the batch.
    pub fn features(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn with_batch(self, batch: usize) -> Shape {
        Shape { batch, ..self }
    }
}

impl From<[usize; 4]> for Shape {
    fn from(v: [usize; 4]) -> Self {
        Shape::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Shape> for [usize; 4] {
    fn from(s: Shape) -> Self {
        [s.batch, s.channels, s.height, s.width]
    }
}
