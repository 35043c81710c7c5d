//! The `.pict` weight container: a JSON shape manifest, a float dictionary and
//! one dictionary index per weight value.
//!
//! ```text
//! [u32 BE len][manifest: JSON [{"name": .., "shape": [..]}, ..]]
//! [u32 BE len][dictionary: f32 LE ..]
//! [u32 BE len][codes: u8 ..]
//! ```

mod container;
mod error;
mod quantize;
mod weights;

#[macro_use]
extern crate log;

pub use container::{decode, encode, segments};
pub use error::FormatError;
pub use quantize::Dictionary;
pub use weights::{Iter, Weights};

use serde::{Deserialize, Serialize};
use tensor::udim;

/// One record of the shape manifest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct ShapeEntry {
    pub name: String,
    pub shape: Vec<udim>,
}

impl ShapeEntry {
    /// Number of values the entry takes from the code stream, `None` on overflow.
    pub fn size(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }
}

#[test]
fn test_manifest_json() {
    let json = r#"[{"name":"a","shape":[2]},{"name":"b","shape":[2,2]}]"#;
    let manifest: Vec<ShapeEntry> = serde_json::from_str(json).unwrap();
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest[1].name, "b");
    assert_eq!(manifest[1].size(), Some(4));
    assert_eq!(serde_json::to_string(&manifest).unwrap(), json);
}
