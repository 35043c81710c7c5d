//! Helpers shared by the workspace crates.

pub mod test_weights;
