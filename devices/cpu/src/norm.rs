use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use tensor::Tensor;

/// Per-channel mean and population variance of `x: [h, w, c]`.
pub fn moments<T, U, V>(mean: &mut Tensor<T>, variance: &mut Tensor<U>, x: &Tensor<V>)
where
    T: DerefMut<Target = [f32]>,
    U: DerefMut<Target = [f32]>,
    V: Deref<Target = [f32]>,
{
    let &[h, w, c] = x.shape() else {
        panic!("x shape: {:?}", x.shape())
    };
    assert_eq!(mean.shape(), &[c]);
    assert_eq!(variance.shape(), &[c]);

    let n = (h * w) as f32;
    let c = c as usize;
    let x = x.as_slice();

    let mean = mean.as_mut_slice();
    mean.fill(0.);
    for pixel in x.chunks_exact(c) {
        mean.iter_mut().zip(pixel).for_each(|(m, x)| *m += x);
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let variance = variance.as_mut_slice();
    variance.fill(0.);
    for pixel in x.chunks_exact(c) {
        variance
            .iter_mut()
            .zip(pixel.iter().zip(&*mean))
            .for_each(|(v, (x, m))| *v += (x - m) * (x - m));
    }
    variance.iter_mut().for_each(|v| *v /= n);
}

pub fn batch_norm<T, U, V, W, X>(
    x: &mut Tensor<T>,
    mean: &Tensor<U>,
    variance: &Tensor<V>,
    scale: &Tensor<W>,
    offset: &Tensor<X>,
    epsilon: f32,
) where
    T: DerefMut<Target = [f32]>,
    U: Deref<Target = [f32]>,
    V: Deref<Target = [f32]>,
    W: Deref<Target = [f32]>,
    X: Deref<Target = [f32]>,
{
    let &[.., c] = x.shape() else { panic!() };
    for t in [mean.shape(), variance.shape(), scale.shape(), offset.shape()] {
        assert_eq!(t, &[c]);
    }

    // (x - μ) * γ / √(σ² + ε) + β
    let k = variance
        .as_slice()
        .iter()
        .zip(scale.as_slice())
        .map(|(v, g)| g / (v + epsilon).sqrt())
        .collect::<Vec<_>>();
    let mean = mean.as_slice();
    let offset = offset.as_slice();
    x.as_mut_slice()
        .par_chunks_mut(c as usize)
        .for_each(|pixel| {
            for (i, x) in pixel.iter_mut().enumerate() {
                *x = (*x - mean[i]) * k[i] + offset[i];
            }
        });
}

#[test]
fn test_moments() {
    // channel 0: 1 2 3 4, channel 1: 0 0 0 8
    let x = Tensor::new(&[2, 2, 2], vec![1., 0., 2., 0., 3., 0., 4., 8.]);
    let mut mean = Tensor::alloc(&[2]);
    let mut variance = Tensor::alloc(&[2]);
    moments(&mut mean, &mut variance, &x);
    assert_eq!(mean.as_slice(), &[2.5, 2.]);
    assert_eq!(variance.as_slice(), &[1.25, 12.]);
}

#[test]
fn test_batch_norm() {
    let mut x = Tensor::new(&[2, 2, 2], vec![1., 0., 2., 0., 3., 0., 4., 8.]);
    let mut mean = Tensor::alloc(&[2]);
    let mut variance = Tensor::alloc(&[2]);
    moments(&mut mean, &mut variance, &x);
    let scale = Tensor::new(&[2], vec![1., 2.]);
    let offset = Tensor::new(&[2], vec![0., 1.]);
    batch_norm(&mut x, &mean, &variance, &scale, &offset, 0.);

    let x = x.as_slice();
    let (mut m, mut v) = (0., 0.);
    for i in [0, 2, 4, 6] {
        m += x[i] / 4.;
    }
    for i in [0, 2, 4, 6] {
        v += (x[i] - m) * (x[i] - m) / 4.;
    }
    assert!(m.abs() < 1e-6);
    assert!((v - 1.).abs() < 1e-5);
    // channel 1: (0 - 2) / √12 * 2 + 1
    assert!((x[1] - (1. - 2. * 2. / 12f32.sqrt())).abs() < 1e-5);
}
