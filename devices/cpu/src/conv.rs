use crate::mat_mul::{mat_mul, Strides};
use common_devices::same_padding;
use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use tensor::{udim, Tensor};

/// y = conv(x, w), "same" padding
///
/// - y: [oh, ow, co]
/// - x: [h, w, ci]
/// - w: [kh, kw, ci, co]
pub fn conv2d<T, U, V>(y: &mut Tensor<T>, x: &Tensor<U>, w: &Tensor<V>, stride: udim)
where
    T: DerefMut<Target = [f32]>,
    U: Deref<Target = [f32]>,
    V: Deref<Target = [f32]>,
{
    let &[h, wi, ci] = x.shape() else {
        panic!("x shape: {:?}", x.shape())
    };
    let &[kh, kw, ci_, co] = w.shape() else {
        panic!("w shape: {:?}", w.shape())
    };
    assert_eq!(ci, ci_);
    let (oh, pad_h) = same_padding(h, kh, stride);
    let (ow, pad_w) = same_padding(wi, kw, stride);
    assert_eq!(y.shape(), &[oh, ow, co]);

    let [h, wi, ci, kh, kw, co, oh, ow, s] =
        [h, wi, ci, kh, kw, co, oh, ow, stride].map(|d| d as usize);
    let k = kh * kw * ci;

    // im2col: one row of [kh, kw, ci] per output pixel, zeros where padded
    let x = x.as_slice();
    let mut col = vec![0.; oh * ow * k];
    col.par_chunks_mut(ow * k).enumerate().for_each(|(oy, row)| {
        for ky in 0..kh {
            let Some(iy) = (oy * s + ky).checked_sub(pad_h as _).filter(|&iy| iy < h) else {
                continue;
            };
            for ox in 0..ow {
                let patch = &mut row[ox * k..][..k];
                for kx in 0..kw {
                    let Some(ix) = (ox * s + kx).checked_sub(pad_w as _).filter(|&ix| ix < wi)
                    else {
                        continue;
                    };
                    patch[(ky * kw + kx) * ci..][..ci]
                        .copy_from_slice(&x[(iy * wi + ix) * ci..][..ci]);
                }
            }
        }
    });

    mat_mul(
        y.as_mut_slice(),
        &col,
        w.as_slice(),
        Strides::row_major(co),
        (oh * ow, co, k),
    );
}

/// y = conv_transpose(x, w), "same" padding, the shape of `y` decides the output size
///
/// - y: [oh, ow, co]
/// - x: [h, w, ci]
/// - w: [kh, kw, co, ci]
pub fn conv2d_transpose<T, U, V>(y: &mut Tensor<T>, x: &Tensor<U>, w: &Tensor<V>, stride: udim)
where
    T: DerefMut<Target = [f32]>,
    U: Deref<Target = [f32]>,
    V: Deref<Target = [f32]>,
{
    let &[h, wi, ci] = x.shape() else {
        panic!("x shape: {:?}", x.shape())
    };
    let &[kh, kw, co, ci_] = w.shape() else {
        panic!("w shape: {:?}", w.shape())
    };
    assert_eq!(ci, ci_);
    let &[oh, ow, co_] = y.shape() else {
        panic!("y shape: {:?}", y.shape())
    };
    assert_eq!(co, co_);
    // padding of the forward convolution this one is the transpose of
    let (h_, pad_h) = same_padding(oh, kh, stride);
    let (w_, pad_w) = same_padding(ow, kw, stride);
    assert_eq!((h_, w_), (h, wi), "output shape does not invert the stride");

    let [h, wi, ci, kh, kw, co, ow, s] = [h, wi, ci, kh, kw, co, ow, stride].map(|d| d as usize);
    let n = kh * kw * co;

    // every input pixel projected onto all kernel taps: [h * w, kh * kw * co]
    let mut col = vec![0.; h * wi * n];
    mat_mul(
        &mut col,
        x.as_slice(),
        w.as_slice(),
        Strides::transposed(ci),
        (h * wi, n, ci),
    );

    // col2im as a gather so output rows are independent
    let col = &col;
    y.as_mut_slice()
        .par_chunks_mut(ow * co)
        .enumerate()
        .for_each(|(oy, row)| {
            row.fill(0.);
            for ky in 0..kh {
                let Some(iy) = tap(oy, ky, pad_h as _, s).filter(|&iy| iy < h) else {
                    continue;
                };
                for ox in 0..ow {
                    let pixel = &mut row[ox * co..][..co];
                    for kx in 0..kw {
                        let Some(ix) = tap(ox, kx, pad_w as _, s).filter(|&ix| ix < wi) else {
                            continue;
                        };
                        let src = &col[(iy * wi + ix) * n + (ky * kw + kx) * co..][..co];
                        pixel.iter_mut().zip(src).for_each(|(y, x)| *y += x);
                    }
                }
            }
        });
}

/// Input index feeding output `o` through kernel tap `k`, if any.
#[inline]
fn tap(o: usize, k: usize, pad: usize, stride: usize) -> Option<usize> {
    (o + pad)
        .checked_sub(k)
        .filter(|t| t % stride == 0)
        .map(|t| t / stride)
}

#[test]
fn test_conv2d() {
    let x = Tensor::new(&[3, 3, 1], (1..=9).map(|x| x as f32).collect::<Vec<_>>());
    let w = Tensor::new(&[3, 3, 1, 1], vec![1.; 9]);
    let mut y = Tensor::alloc(&[3, 3, 1]);
    conv2d(&mut y, &x, &w, 1);
    assert_eq!(
        y.as_slice(),
        &[
            12., 21., 16., //
            27., 45., 33., //
            24., 39., 28., //
        ]
    );

    let mut y = Tensor::alloc(&[2, 2, 1]);
    conv2d(&mut y, &x, &w, 2);
    assert_eq!(y.as_slice(), &[12., 16., 24., 28.]);
}

#[test]
fn test_conv2d_channels() {
    // 1x1 kernel mixing two input channels into three outputs
    let x = Tensor::new(&[1, 2, 2], vec![1., 2., 3., 4.]);
    let w = Tensor::new(&[1, 1, 2, 3], vec![1., 0., 1., 0., 1., -1.]);
    let mut y = Tensor::alloc(&[1, 2, 3]);
    conv2d(&mut y, &x, &w, 1);
    assert_eq!(y.as_slice(), &[1., 2., -1., 3., 4., -1.]);
}

#[test]
fn test_conv2d_transpose_is_adjoint() {
    fn values(n: usize, seed: usize) -> Vec<f32> {
        (0..n)
            .map(|i| ((i * 7 + seed) % 13) as f32 / 13. - 0.5)
            .collect()
    }
    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(a, b)| a * b).sum()
    }

    let w = Tensor::new(&[4, 4, 2, 3], values(96, 1));
    let x = Tensor::new(&[4, 4, 2], values(32, 2));
    let g = Tensor::new(&[2, 2, 3], values(12, 3));

    let mut y = Tensor::alloc(&[2, 2, 3]);
    conv2d(&mut y, &x, &w, 2);
    let mut xt = Tensor::alloc(&[4, 4, 2]);
    conv2d_transpose(&mut xt, &g, &w, 2);

    let lhs = dot(y.as_slice(), g.as_slice());
    let rhs = dot(x.as_slice(), xt.as_slice());
    assert!((lhs - rhs).abs() < 1e-4, "{lhs} vs {rhs}");
}

#[test]
fn test_conv2d_transpose_upsamples() {
    // a single pixel spreads the kernel over the doubled output
    let x = Tensor::new(&[1, 1, 1], vec![2.]);
    let w = Tensor::new(&[4, 4, 1, 1], (0..16).map(|x| x as f32).collect::<Vec<_>>());
    let mut y = Tensor::alloc(&[2, 2, 1]);
    conv2d_transpose(&mut y, &x, &w, 2);
    // pad 1: output (oy, ox) reads tap (oy + 1, ox + 1)
    assert_eq!(y.as_slice(), &[10., 12., 18., 20.]);
}
