mod concat;
mod conv;
mod elementwise;
mod mat_mul;
mod norm;

use std::ops::{Deref, DerefMut};
use tensor::{udim, Tensor};

pub extern crate tensor;

pub use common_devices::{same_padding, Kernels};

/// Runs every operation on the host, spreading rows over the rayon pool.
#[derive(Clone, Copy, Default, Debug)]
pub struct CpuKernels;

impl Kernels for CpuKernels {
    #[inline]
    fn scale_shift<T>(&self, x: &mut Tensor<T>, a: f32, b: f32)
    where
        T: DerefMut<Target = [f32]>,
    {
        elementwise::map(x, |x| x * a + b);
    }

    #[inline]
    fn conv2d<T, U, V, W>(
        &self,
        y: &mut Tensor<T>,
        x: &Tensor<U>,
        w: &Tensor<V>,
        b: &Tensor<W>,
        stride: udim,
    ) where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
        V: Deref<Target = [f32]>,
        W: Deref<Target = [f32]>,
    {
        conv::conv2d(y, x, w, stride);
        elementwise::add_bias(y, b);
    }

    #[inline]
    fn conv2d_transpose<T, U, V>(&self, y: &mut Tensor<T>, x: &Tensor<U>, w: &Tensor<V>, stride: udim)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
        V: Deref<Target = [f32]>,
    {
        conv::conv2d_transpose(y, x, w, stride);
    }

    #[inline]
    fn add_bias<T, U>(&self, y: &mut Tensor<T>, b: &Tensor<U>)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
    {
        elementwise::add_bias(y, b);
    }

    #[inline]
    fn concat<T, U, V>(&self, y: &mut Tensor<T>, a: &Tensor<U>, b: &Tensor<V>)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
        V: Deref<Target = [f32]>,
    {
        concat::concat(y, a, b);
    }

    #[inline]
    fn moments<T, U, V>(&self, mean: &mut Tensor<T>, variance: &mut Tensor<U>, x: &Tensor<V>)
    where
        T: DerefMut<Target = [f32]>,
        U: DerefMut<Target = [f32]>,
        V: Deref<Target = [f32]>,
    {
        norm::moments(mean, variance, x);
    }

    #[inline]
    fn batch_norm<T, U, V, W, X>(
        &self,
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
        norm::batch_norm(x, mean, variance, scale, offset, epsilon);
    }

    #[inline]
    fn relu<T>(&self, x: &mut Tensor<T>)
    where
        T: DerefMut<Target = [f32]>,
    {
        elementwise::map(x, |x| x.max(0.));
    }

    #[inline]
    fn leaky_relu<T>(&self, x: &mut Tensor<T>, alpha: f32)
    where
        T: DerefMut<Target = [f32]>,
    {
        elementwise::map(x, |x| if x < 0. { x * alpha } else { x });
    }

    #[inline]
    fn tanh<T>(&self, x: &mut Tensor<T>)
    where
        T: DerefMut<Target = [f32]>,
    {
        elementwise::map(x, f32::tanh);
    }
}

#[test]
fn test_activations() {
    let mut x = Tensor::new(&[1, 2, 2], vec![-2., -0.5, 0., 3.]);
    CpuKernels.leaky_relu(&mut x, 0.2);
    assert_eq!(x.as_slice(), &[-0.4, -0.1, 0., 3.]);
    CpuKernels.relu(&mut x);
    assert_eq!(x.as_slice(), &[0., 0., 0., 3.]);
    CpuKernels.scale_shift(&mut x, 2., -1.);
    assert_eq!(x.as_slice(), &[-1., -1., -1., 5.]);
    CpuKernels.tanh(&mut x);
    assert!((x.as_slice()[0] + 0.761_594_2).abs() < 1e-6);
}
