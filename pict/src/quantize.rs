use crate::FormatError;

/// The distinct values a container is quantized to; a code is an index into it.
#[derive(Clone, PartialEq, Debug)]
pub struct Dictionary(Vec<f32>);

impl Dictionary {
    /// Codes are single bytes.
    pub const MAX_LEN: usize = 256;

    pub fn new(values: Vec<f32>) -> Result<Self, FormatError> {
        if values.is_empty() || values.len() > Self::MAX_LEN {
            return Err(FormatError::DictionarySize { len: values.len() });
        }
        Ok(Self(values))
    }

    /// `levels` evenly spaced values spanning `[min, max]`.
    pub fn linear(min: f32, max: f32, levels: usize) -> Self {
        let levels = levels.clamp(1, Self::MAX_LEN);
        if levels == 1 || min >= max {
            return Self(vec![min]);
        }
        let step = (max - min) / (levels - 1) as f32;
        Self(
            (0..levels)
                .map(|i| if i == levels - 1 { max } else { min + step * i as f32 })
                .collect(),
        )
    }

    /// A linear dictionary over the range of `values`.
    pub fn fit(values: impl IntoIterator<Item = f32>, levels: usize) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|x| x.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), x| {
                (min.min(x), max.max(x))
            });
        if min > max {
            Self(vec![0.])
        } else {
            Self::linear(min, max, levels)
        }
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the nearest dictionary value.
    pub fn quantize(&self, x: f32) -> u8 {
        let mut best = 0;
        let mut distance = f32::INFINITY;
        for (i, &v) in self.0.iter().enumerate() {
            let d = (v - x).abs();
            if d < distance {
                best = i;
                distance = d;
            }
        }
        best as _
    }
}

#[test]
fn test_linear() {
    let dict = Dictionary::linear(-1., 1., 5);
    assert_eq!(dict.values(), &[-1., -0.5, 0., 0.5, 1.]);
    assert_eq!(Dictionary::linear(3., 3., 16).values(), &[3.]);
    assert_eq!(Dictionary::linear(0., 1., 1000).len(), Dictionary::MAX_LEN);
}

#[test]
fn test_quantize() {
    let dict = Dictionary::linear(-1., 1., 5);
    assert_eq!(dict.quantize(-7.), 0);
    assert_eq!(dict.quantize(-0.3), 1);
    assert_eq!(dict.quantize(0.1), 2);
    assert_eq!(dict.quantize(0.8), 4);
    assert_eq!(dict.quantize(f32::NAN), 0);
}

#[test]
fn test_new() {
    assert!(Dictionary::new(vec![]).is_err());
    assert!(Dictionary::new(vec![0.; 257]).is_err());
    assert_eq!(Dictionary::new(vec![0., 1.]).unwrap().len(), 2);
}
