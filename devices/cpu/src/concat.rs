use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use tensor::Tensor;

/// y[h, w] = a[h, w] ++ b[h, w]
pub fn concat<T, U, V>(y: &mut Tensor<T>, a: &Tensor<U>, b: &Tensor<V>)
where
    T: DerefMut<Target = [f32]>,
    U: Deref<Target = [f32]>,
    V: Deref<Target = [f32]>,
{
    let &[h, w, ca] = a.shape() else {
        panic!("a shape: {:?}", a.shape())
    };
    let &[hb, wb, cb] = b.shape() else {
        panic!("b shape: {:?}", b.shape())
    };
    assert_eq!((h, w), (hb, wb), "spatial dimensions differ");
    assert_eq!(y.shape(), &[h, w, ca + cb]);

    let (ca, cb) = (ca as usize, cb as usize);
    let a = a.as_slice();
    let b = b.as_slice();
    y.as_mut_slice()
        .par_chunks_mut(ca + cb)
        .enumerate()
        .for_each(|(i, pixel)| {
            let (left, right) = pixel.split_at_mut(ca);
            left.copy_from_slice(&a[i * ca..][..ca]);
            right.copy_from_slice(&b[i * cb..][..cb]);
        });
}

#[test]
fn test_concat() {
    let a = Tensor::new(&[1, 2, 1], vec![1., 2.]);
    let b = Tensor::new(&[1, 2, 2], vec![10., 11., 20., 21.]);
    let mut y = Tensor::alloc(&[1, 2, 3]);
    concat(&mut y, &a, &b);
    assert_eq!(y.as_slice(), &[1., 10., 11., 2., 20., 21.]);
}
