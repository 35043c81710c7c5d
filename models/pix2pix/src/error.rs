use std::{error, fmt};
use tensor::udim;

/// Failure to build or run the generator.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum EvalError {
    /// A required parameter is absent from the weights.
    MissingWeight(String),
    /// A parameter has a shape the topology cannot use.
    Shape {
        name: String,
        shape: Vec<udim>,
        expected: String,
    },
    /// The input is not `[h, w, 3]` with `h` and `w` multiples of 256.
    Input(Vec<udim>),
}

impl error::Error for EvalError {}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingWeight(name) => write!(f, "missing weight \"{name}\""),
            Self::Shape {
                name,
                shape,
                expected,
            } => write!(f, "\"{name}\" has shape {shape:?}, expected {expected}"),
            Self::Input(shape) => write!(
                f,
                "input shape {shape:?} is not [h, w, 3] with h and w multiples of 256"
            ),
        }
    }
}
