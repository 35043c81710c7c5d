use std::{
    fmt,
    ops::{Deref, Range},
    sync::Arc,
};

/// A window into a shared, immutable `f32` buffer.
///
/// Every weight decoded from one container points into the same buffer.
#[derive(Clone)]
pub struct Storage {
    data: Arc<[f32]>,
    range: Range<usize>,
}

impl Storage {
    #[inline]
    pub fn new(data: Arc<[f32]>, offset: usize, len: usize) -> Self {
        assert!(offset + len <= data.len());
        Self {
            data,
            range: offset..offset + len,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data[self.range.clone()]
    }

    /// Range of this window inside the shared buffer.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

impl Deref for Storage {
    type Target = [f32];
    #[inline]
    fn deref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("buffer", &self.data.len())
            .field("range", &self.range)
            .finish()
    }
}

#[test]
fn test_window() {
    let data: Arc<[f32]> = Arc::from(vec![0., 1., 2., 3., 4.]);
    let a = Storage::new(data.clone(), 0, 2);
    let b = Storage::new(data, 2, 3);
    assert_eq!(&*a, &[0., 1.]);
    assert_eq!(&*b, &[2., 3., 4.]);
    assert_eq!(b.range(), 2..5);
}
