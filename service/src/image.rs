//! Conversions between 8-bit pixel buffers and `[h, w, 3]` tensors in [0, 1].

use std::ops::Deref;
use tensor::{udim, Tensor};

/// Interleaved RGB bytes, row by row, to a tensor.
pub fn from_rgb8(pixels: &[u8], width: udim, height: udim) -> Tensor<Vec<f32>> {
    from_interleaved(pixels, width, height, 3)
}

/// Interleaved RGBA bytes to a tensor; alpha is dropped.
pub fn from_rgba8(pixels: &[u8], width: udim, height: udim) -> Tensor<Vec<f32>> {
    from_interleaved(pixels, width, height, 4)
}

fn from_interleaved(pixels: &[u8], width: udim, height: udim, stride: usize) -> Tensor<Vec<f32>> {
    assert_eq!(pixels.len(), width as usize * height as usize * stride);
    let data = pixels
        .chunks_exact(stride)
        .flat_map(|px| &px[..3])
        .map(|&v| v as f32 / 255.)
        .collect::<Vec<_>>();
    Tensor::new(&[height, width, 3], data)
}

/// A `[h, w, 3]` tensor to interleaved RGBA bytes, clamping to [0, 1], opaque.
pub fn to_rgba8<T>(image: &Tensor<T>) -> Vec<u8>
where
    T: Deref<Target = [f32]>,
{
    let &[_, _, 3] = image.shape() else {
        panic!("expected an [h, w, 3] image, got {:?}", image.shape());
    };
    let to_byte = |v: f32| (v.clamp(0., 1.) * 255.).round() as u8;
    image
        .as_slice()
        .chunks_exact(3)
        .flat_map(|px| [to_byte(px[0]), to_byte(px[1]), to_byte(px[2]), u8::MAX])
        .collect()
}

#[test]
fn test_from_rgba8() {
    let t = from_rgba8(&[0, 255, 51, 7, 255, 0, 0, 9], 2, 1);
    assert_eq!(t.shape(), &[1, 2, 3]);
    assert_eq!(t.as_slice(), &[0., 1., 0.2, 1., 0., 0.]);
}

#[test]
fn test_from_rgb8() {
    let t = from_rgb8(&[0, 255, 51, 255, 0, 0], 1, 2);
    assert_eq!(t.shape(), &[2, 1, 3]);
    assert_eq!(t.as_slice(), &[0., 1., 0.2, 1., 0., 0.]);
}

#[test]
fn test_to_rgba8() {
    let t = Tensor::new(&[1, 2, 3], vec![-0.5, 0.5, 1.5, 0.2, f32::NAN, 1.]);
    assert_eq!(to_rgba8(&t), [0, 128, 255, 255, 51, 0, 255, 255]);
}
