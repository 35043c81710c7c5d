use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use tensor::Tensor;

pub fn map<T>(x: &mut Tensor<T>, f: impl Fn(f32) -> f32 + Sync)
where
    T: DerefMut<Target = [f32]>,
{
    x.as_mut_slice().par_iter_mut().for_each(|x| *x = f(*x));
}

pub fn add_bias<T, U>(y: &mut Tensor<T>, b: &Tensor<U>)
where
    T: DerefMut<Target = [f32]>,
    U: Deref<Target = [f32]>,
{
    let &[.., c] = y.shape() else { panic!() };
    assert_eq!(b.shape(), &[c]);

    let b = b.as_slice();
    y.as_mut_slice()
        .par_chunks_mut(c as usize)
        .for_each(|pixel| pixel.iter_mut().zip(b).for_each(|(y, b)| *y += b));
}

#[test]
fn test_add_bias() {
    let mut y = Tensor::new(&[2, 1, 3], vec![0.; 6]);
    add_bias(&mut y, &Tensor::new(&[3], vec![1., 2., 3.]));
    assert_eq!(y.as_slice(), &[1., 2., 3., 1., 2., 3.]);
}
