use crate::udim;
use smallvec::SmallVec;
use std::ops::{Deref, DerefMut};

pub type Shape = SmallVec<[udim; 4]>;

#[derive(Clone, Debug)]
pub struct Tensor<Physical> {
    shape: Shape,
    physical: Physical,
}

impl<Physical: Deref<Target = [f32]>> Tensor<Physical> {
    #[inline]
    pub fn new(shape: &[udim], physical: Physical) -> Self {
        assert_eq!(
            physical.len(),
            shape.iter().map(|&d| d as usize).product::<usize>(),
            "shape {shape:?} does not match {} elements",
            physical.len(),
        );
        Self {
            shape: Shape::from_slice(shape),
            physical,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.physical
    }

    /// Borrows the elements as a tensor view.
    #[inline]
    pub fn view(&self) -> Tensor<&[f32]> {
        Tensor {
            shape: self.shape.clone(),
            physical: self.as_slice(),
        }
    }

    /// Copies the elements into an owned tensor.
    #[inline]
    pub fn copied(&self) -> Tensor<Vec<f32>> {
        Tensor {
            shape: self.shape.clone(),
            physical: self.physical.to_vec(),
        }
    }
}

impl<Physical: DerefMut<Target = [f32]>> Tensor<Physical> {
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.physical
    }
}

impl Tensor<Vec<f32>> {
    /// Allocates a zero-filled tensor.
    #[inline]
    pub fn alloc(shape: &[udim]) -> Self {
        let size = shape.iter().map(|&d| d as usize).product();
        Self {
            shape: Shape::from_slice(shape),
            physical: vec![0.; size],
        }
    }
}

impl<Physical> Tensor<Physical> {
    #[inline]
    pub fn shape(&self) -> &[udim] {
        &self.shape
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().map(|&d| d as usize).product()
    }

    #[inline]
    pub const fn physical(&self) -> &Physical {
        &self.physical
    }

    #[inline]
    pub fn physical_mut(&mut self) -> &mut Physical {
        &mut self.physical
    }

    #[inline]
    pub fn take_physical(self) -> Physical {
        self.physical
    }

    #[inline]
    pub fn map_physical<U>(self, f: impl FnOnce(Physical) -> U) -> Tensor<U> {
        Tensor {
            shape: self.shape,
            physical: f(self.physical),
        }
    }

    /// Row-major data makes every reshape free; only the element count must agree.
    pub fn reshape(self, shape: &[udim]) -> Self {
        assert_eq!(
            self.size(),
            shape.iter().map(|&d| d as usize).product::<usize>(),
            "cannot reshape {:?} into {shape:?}",
            self.shape,
        );
        Self {
            shape: Shape::from_slice(shape),
            physical: self.physical,
        }
    }
}

#[test]
fn test_reshape() {
    let t = Tensor::new(&[2, 3], (0..6).map(|x| x as f32).collect::<Vec<_>>());
    assert_eq!(t.size(), 6);
    let t = t.reshape(&[3, 2, 1]);
    assert_eq!(t.shape(), &[3, 2, 1]);
    assert_eq!(t.as_slice(), &[0., 1., 2., 3., 4., 5.]);
}

#[test]
#[should_panic]
fn test_bad_shape() {
    let _ = Tensor::new(&[2, 2], vec![0.; 3]);
}
