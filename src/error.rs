//! Error type shared by all public operations.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WindingSurfaceError {
    #[error("{name} needs to be in row-major storage order")]
    Layout { name: &'static str },

    #[error("{name} has shape {got:?}, expected {expected}")]
    Shape {
        name: &'static str,
        expected: String,
        got: Vec<usize>,
    },

    #[error("{name} has length {got}, expected {expected}")]
    Length {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Output assembly failed: {0}")]
    NdShape(#[from] ndarray::ShapeError),
}

pub type WsResult<T> = Result<T, WindingSurfaceError>;
