//! The tensor operations a generator pass needs from a compute backend.
//!
//! Activations are `[height, width, channels]`. Convolution kernels are
//! `[kh, kw, in, out]`, transposed convolution kernels `[kh, kw, out, in]`.

use std::ops::{Deref, DerefMut};
use tensor::{udim, Tensor};

pub trait Kernels {
    /// x = x * a + b
    fn scale_shift<T>(&self, x: &mut Tensor<T>, a: f32, b: f32)
    where
        T: DerefMut<Target = [f32]>;

    /// Strided convolution with "same" padding, bias added.
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
        W: Deref<Target = [f32]>;

    /// Transposed convolution with "same" padding; `y` carries the target shape.
    fn conv2d_transpose<T, U, V>(&self, y: &mut Tensor<T>, x: &Tensor<U>, w: &Tensor<V>, stride: udim)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
        V: Deref<Target = [f32]>;

    /// Adds `b[c]` to every element of channel `c`.
    fn add_bias<T, U>(&self, y: &mut Tensor<T>, b: &Tensor<U>)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>;

    /// Concatenates along the channel axis; spatial dimensions must agree.
    fn concat<T, U, V>(&self, y: &mut Tensor<T>, a: &Tensor<U>, b: &Tensor<V>)
    where
        T: DerefMut<Target = [f32]>,
        U: Deref<Target = [f32]>,
        V: Deref<Target = [f32]>;

    /// Per-channel mean and population variance over the spatial axes.
    fn moments<T, U, V>(&self, mean: &mut Tensor<T>, variance: &mut Tensor<U>, x: &Tensor<V>)
    where
        T: DerefMut<Target = [f32]>,
        U: DerefMut<Target = [f32]>,
        V: Deref<Target = [f32]>;

    /// x = (x - mean) / sqrt(variance + epsilon) * scale + offset, per channel.
    #[allow(clippy::too_many_arguments)]
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
        X: Deref<Target = [f32]>;

    fn relu<T>(&self, x: &mut Tensor<T>)
    where
        T: DerefMut<Target = [f32]>;

    fn leaky_relu<T>(&self, x: &mut Tensor<T>, alpha: f32)
    where
        T: DerefMut<Target = [f32]>;

    fn tanh<T>(&self, x: &mut Tensor<T>)
    where
        T: DerefMut<Target = [f32]>;
}

/// "Same" padding along one axis: `(output length, padding before the first element)`.
///
/// The output length is `ceil(input / stride)`; when the total padding is odd the
/// extra element goes after the data.
#[inline]
pub fn same_padding(input: udim, kernel: udim, stride: udim) -> (udim, udim) {
    let output = input.div_ceil(stride);
    let total = ((output - 1) * stride + kernel).saturating_sub(input);
    (output, total / 2)
}

#[test]
fn test_same_padding() {
    assert_eq!(same_padding(256, 4, 2), (128, 1));
    assert_eq!(same_padding(2, 4, 2), (1, 1));
    assert_eq!(same_padding(5, 3, 2), (3, 1));
    assert_eq!(same_padding(7, 1, 1), (7, 0));
    assert_eq!(same_padding(4, 4, 2), (2, 1));
}
