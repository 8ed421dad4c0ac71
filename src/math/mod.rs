pub mod matrix;
pub mod shape;

pub use matrix::Matrix;
pub use shape::Shape;
