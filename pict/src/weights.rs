use std::collections::{hash_map::Entry, HashMap};
use tensor::{Storage, Tensor};

/// Decoded weights keyed by name, in manifest order.
///
/// All tensors share the single dequantized buffer of their container.
pub struct Weights {
    index: HashMap<String, usize>,
    tensors: Vec<(String, Tensor<Storage>)>,
    dictionary_len: usize,
}

/// Iterator over [Weights] in manifest order.
pub struct Iter<'a>(std::slice::Iter<'a, (String, Tensor<Storage>)>);

impl Weights {
    pub(crate) fn with_capacity(capacity: usize, dictionary_len: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            tensors: Vec::with_capacity(capacity),
            dictionary_len,
        }
    }

    /// Adds a tensor, returning it back if the name is taken.
    pub(crate) fn insert(
        &mut self,
        name: String,
        tensor: Tensor<Storage>,
    ) -> Result<(), (String, Tensor<Storage>)> {
        match self.index.entry(name) {
            Entry::Occupied(e) => Err((e.key().clone(), tensor)),
            Entry::Vacant(e) => {
                self.tensors.push((e.key().clone(), tensor));
                e.insert(self.tensors.len() - 1);
                Ok(())
            }
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Tensor<Storage>> {
        self.index.get(name).map(|&i| &self.tensors[i].1)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Number of distinct values the container was quantized to.
    #[inline]
    pub fn dictionary_len(&self) -> usize {
        self.dictionary_len
    }

    /// Total number of values across all tensors.
    pub fn values_count(&self) -> usize {
        self.tensors.iter().map(|(_, t)| t.size()).sum()
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tensors.iter().map(|(name, _)| &**name)
    }

    #[inline]
    pub fn iter(&self) -> Iter {
        Iter(self.tensors.iter())
    }
}

impl<'a> IntoIterator for &'a Weights {
    type Item = (&'a str, &'a Tensor<Storage>);
    type IntoIter = Iter<'a>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a Tensor<Storage>);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(name, tensor)| (&**name, tensor))
    }
}

#[test]
fn test_insert() {
    use std::sync::Arc;

    let data: Arc<[f32]> = Arc::from(vec![1., 2., 3.]);
    let mut weights = Weights::with_capacity(2, 3);
    let a = Tensor::new(&[1], Storage::new(data.clone(), 0, 1));
    let b = Tensor::new(&[2], Storage::new(data, 1, 2));
    assert!(weights.insert("b".into(), b.clone()).is_ok());
    assert!(weights.insert("a".into(), a).is_ok());
    assert!(weights.insert("b".into(), b).is_err());

    assert_eq!(weights.len(), 2);
    assert_eq!(weights.values_count(), 3);
    assert_eq!(weights.names().collect::<Vec<_>>(), ["b", "a"]);
    assert_eq!(weights.get("b").unwrap().as_slice(), &[2., 3.]);
    assert!(!weights.contains("c"));
}
