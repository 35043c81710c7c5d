//! Dense `f32` tensors in row-major layout.

mod fmt;
mod storage;
mod tensor;

#[allow(non_camel_case_types)]
pub type udim = u32;

pub use storage::Storage;
pub use tensor::{Shape, Tensor};
