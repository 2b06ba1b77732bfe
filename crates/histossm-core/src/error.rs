use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsmError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input sequence must contain at least one timestep")]
    EmptySequence,

    #[error("Cannot reshape tensor of {numel} elements into shape {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<isize> },

    #[error("Invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
}

impl SsmError {
    /// Shorthand for an `InvalidConfig` error.
    pub fn config(msg: impl Into<String>) -> Self {
        SsmError::InvalidConfig(msg.into())
    }
}
