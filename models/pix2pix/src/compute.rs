use crate::{deprocess, preprocess, EvalError, Generator, Stage, StageStorage, DEPTH};
use common_devices::Kernels;
use std::{iter, ops::Deref, time::Instant};
use tensor::{udim, Storage, Tensor};

/// Height and width of a valid input must be multiples of this.
const ALIGN: udim = 1 << DEPTH;

impl Generator {
    /// Translates an `[h, w, 3]` image with values in [0, 1] into another one.
    pub fn evaluate<K, T>(&self, kernels: &K, input: &Tensor<T>) -> Result<Tensor<Vec<f32>>, EvalError>
    where
        K: Kernels,
        T: Deref<Target = [f32]>,
    {
        let &[h, w, 3] = input.shape() else {
            return Err(EvalError::Input(input.shape().to_vec()));
        };
        if h == 0 || w == 0 || h % ALIGN != 0 || w % ALIGN != 0 {
            return Err(EvalError::Input(input.shape().to_vec()));
        }

        let time = Instant::now();
        let mut x = input.copied();
        preprocess(kernels, &mut x);

        // raw outputs of encoders 1..DEPTH-1, consumed in reverse by the decoders
        let mut skips = Vec::with_capacity(DEPTH as usize - 1);
        for (i, stage) in self.encoders.iter().enumerate() {
            if i > 0 {
                skips.push(x.clone());
                kernels.leaky_relu(&mut x, self.config.leaky_slope);
            }
            x = self.encode(kernels, stage, &x);
            trace!("{:?} -> {:?}", Stage::Encoder(i as u8 + 1), x.shape());
        }

        // the innermost decoder reads the bottleneck alone
        let skips = iter::once(None).chain(skips.into_iter().rev().map(Some));
        for ((i, stage), skip) in self.decoders.iter().enumerate().rev().zip(skips) {
            if let Some(skip) = skip {
                let &[h, w, a] = x.shape() else { unreachable!() };
                let b = skip.shape()[2];
                let mut cat = Tensor::alloc(&[h, w, a + b]);
                kernels.concat(&mut cat, &x, &skip);
                x = cat;
            }
            x = self.decode(kernels, stage, x);
            trace!("{:?} -> {:?}", Stage::Decoder(i as u8 + 1), x.shape());
        }

        deprocess(kernels, &mut x);
        debug!("generator pass on {h}x{w} in {:?}", time.elapsed());
        Ok(x)
    }

    /// Stride-2 convolution, normalized when the stage has parameters for it.
    fn encode<K: Kernels>(&self, kernels: &K, stage: &StageStorage, x: &Tensor<Vec<f32>>) -> Tensor<Vec<f32>> {
        let &[h, w, _] = x.shape() else { unreachable!() };
        let mut y = Tensor::alloc(&[h.div_ceil(2), w.div_ceil(2), stage.channels()]);
        kernels.conv2d(&mut y, x, &stage.kernel, &stage.bias, 2);
        if let Some((gamma, beta)) = &stage.norm {
            self.normalize(kernels, &mut y, gamma, beta);
        }
        y
    }

    /// Rectifies, then upsamples by 2 with a transposed convolution.
    fn decode<K: Kernels>(&self, kernels: &K, stage: &StageStorage, mut x: Tensor<Vec<f32>>) -> Tensor<Vec<f32>> {
        kernels.relu(&mut x);
        let &[h, w, _] = x.shape() else { unreachable!() };
        let mut y = Tensor::alloc(&[h * 2, w * 2, stage.channels()]);
        kernels.conv2d_transpose(&mut y, &x, &stage.kernel, 2);
        kernels.add_bias(&mut y, &stage.bias);
        match &stage.norm {
            Some((gamma, beta)) => self.normalize(kernels, &mut y, gamma, beta),
            None => kernels.tanh(&mut y),
        }
        y
    }

    /// Batch normalization with statistics of `x` itself.
    fn normalize<K: Kernels>(
        &self,
        kernels: &K,
        x: &mut Tensor<Vec<f32>>,
        gamma: &Tensor<Storage>,
        beta: &Tensor<Storage>,
    ) {
        let c = x.shape()[2];
        let mut mean = Tensor::alloc(&[c]);
        let mut variance = Tensor::alloc(&[c]);
        kernels.moments(&mut mean, &mut variance, x);
        kernels.batch_norm(x, &mean, &variance, gamma, beta, self.config.epsilon);
    }
}

#[cfg(test)]
mod tests {
    use crate::{test_utils, EvalError, Generator, Role, Stage, DEPTH};
    use common_cpu::CpuKernels;
    use tensor::Tensor;

    /// An `[h, w, c]` activation in f64 for the loop-based reference pass.
    #[derive(Clone)]
    struct Map {
        h: usize,
        w: usize,
        c: usize,
        v: Vec<f64>,
    }

    impl Map {
        fn zeros(h: usize, w: usize, c: usize) -> Self {
            Self { h, w, c, v: vec![0.; h * w * c] }
        }

        fn map(mut self, f: impl Fn(f64) -> f64) -> Self {
            self.v.iter_mut().for_each(|x| *x = f(*x));
            self
        }
    }

    fn param(generator: &Generator, stage: Stage, role: Role) -> (Vec<usize>, Vec<f64>) {
        let t = generator.weight(stage, role).unwrap();
        (
            t.shape().iter().map(|&d| d as usize).collect(),
            t.as_slice().iter().map(|&x| x as f64).collect(),
        )
    }

    /// Padding before the data for a stride-2 "same" convolution over `len` inputs.
    fn pad(len: usize, k: usize) -> usize {
        let out = len.div_ceil(2);
        ((out - 1) * 2 + k).saturating_sub(len) / 2
    }

    fn conv(x: &Map, generator: &Generator, stage: Stage) -> Map {
        let (shape, k) = param(generator, stage, Role::Kernel);
        let (_, bias) = param(generator, stage, Role::Bias);
        let [kh, kw, ci, co] = shape[..] else { unreachable!() };
        assert_eq!(ci, x.c);
        let (ph, pw) = (pad(x.h, kh), pad(x.w, kw));
        let mut y = Map::zeros(x.h.div_ceil(2), x.w.div_ceil(2), co);
        for oy in 0..y.h {
            for ox in 0..y.w {
                for o in 0..co {
                    let mut sum = bias[o];
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let iy = (oy * 2 + ky) as isize - ph as isize;
                            let ix = (ox * 2 + kx) as isize - pw as isize;
                            if iy < 0 || ix < 0 || iy >= x.h as isize || ix >= x.w as isize {
                                continue;
                            }
                            let (iy, ix) = (iy as usize, ix as usize);
                            for c in 0..ci {
                                sum += x.v[(iy * x.w + ix) * ci + c] * k[((ky * kw + kx) * ci + c) * co + o];
                            }
                        }
                    }
                    y.v[(oy * y.w + ox) * co + o] = sum;
                }
            }
        }
        y
    }

    /// Scatters every input pixel through the kernel onto the doubled output.
    fn conv_transpose(x: &Map, generator: &Generator, stage: Stage) -> Map {
        let (shape, k) = param(generator, stage, Role::Kernel);
        let (_, bias) = param(generator, stage, Role::Bias);
        let [kh, kw, co, ci] = shape[..] else { unreachable!() };
        assert_eq!(ci, x.c);
        let mut y = Map::zeros(x.h * 2, x.w * 2, co);
        let (ph, pw) = (pad(y.h, kh), pad(y.w, kw));
        for iy in 0..x.h {
            for ix in 0..x.w {
                for ky in 0..kh {
                    for kx in 0..kw {
                        let oy = (iy * 2 + ky) as isize - ph as isize;
                        let ox = (ix * 2 + kx) as isize - pw as isize;
                        if oy < 0 || ox < 0 || oy >= y.h as isize || ox >= y.w as isize {
                            continue;
                        }
                        let (oy, ox) = (oy as usize, ox as usize);
                        for o in 0..co {
                            for c in 0..ci {
                                y.v[(oy * y.w + ox) * co + o] +=
                                    x.v[(iy * x.w + ix) * ci + c] * k[((ky * kw + kx) * co + o) * ci + c];
                            }
                        }
                    }
                }
            }
        }
        for (i, v) in y.v.iter_mut().enumerate() {
            *v += bias[i % co];
        }
        y
    }

    fn batch_norm(mut x: Map, generator: &Generator, stage: Stage) -> Map {
        let (_, gamma) = param(generator, stage, Role::Gamma);
        let (_, beta) = param(generator, stage, Role::Beta);
        let n = (x.h * x.w) as f64;
        for c in 0..x.c {
            let channel = || x.v.iter().skip(c).step_by(x.c);
            let mean = channel().sum::<f64>() / n;
            let variance = channel().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let k = gamma[c] / (variance + 1e-5).sqrt();
            for v in x.v.iter_mut().skip(c).step_by(x.c) {
                *v = (*v - mean) * k + beta[c];
            }
        }
        x
    }

    /// Channels of `a` first, then those of `b`.
    fn concat(a: &Map, b: &Map) -> Map {
        let mut y = Map::zeros(a.h, a.w, a.c + b.c);
        for p in 0..a.h * a.w {
            let dst = &mut y.v[p * y.c..][..y.c];
            dst[..a.c].copy_from_slice(&a.v[p * a.c..][..a.c]);
            dst[a.c..].copy_from_slice(&b.v[p * b.c..][..b.c]);
        }
        y
    }

    /// The generator written as plain loops over a list of layer outputs.
    fn reference(generator: &Generator, input: &Map) -> Map {
        let mut layers = Vec::<Map>::new();
        for i in 1..=DEPTH {
            let stage = Stage::Encoder(i);
            let x = match layers.last() {
                None => input.clone().map(|x| x * 2. - 1.),
                Some(prev) => prev.clone().map(|x| if x < 0. { 0.2 * x } else { x }),
            };
            let y = conv(&x, generator, stage);
            layers.push(if i == 1 { y } else { batch_norm(y, generator, stage) });
        }
        for i in (1..=DEPTH).rev() {
            let stage = Stage::Decoder(i);
            let x = if i == DEPTH {
                layers[DEPTH as usize - 1].clone()
            } else {
                concat(layers.last().unwrap(), &layers[i as usize - 1])
            };
            let y = conv_transpose(&x.map(|x| x.max(0.)), generator, stage);
            layers.push(if i == 1 {
                y.map(f64::tanh)
            } else {
                batch_norm(y, generator, stage)
            });
        }
        layers.pop().unwrap().map(|x| x * 0.5 + 0.5)
    }

    #[test]
    fn test_matches_reference() {
        let generator = Generator::new(&test_utils::random_weights(1, |_| false)).unwrap();
        let values = (0..256 * 256 * 3)
            .map(|i| ((i * 37 + i / 768 * 11) % 101) as f32 / 100.)
            .collect::<Vec<_>>();
        let expected = reference(
            &generator,
            &Map {
                h: 256,
                w: 256,
                c: 3,
                v: values.iter().map(|&x| x as f64).collect(),
            },
        );
        let output = generator
            .evaluate(&CpuKernels, &Tensor::new(&[256, 256, 3], values))
            .unwrap();

        assert_eq!(output.shape(), &[256, 256, 3]);
        let max_err = output
            .as_slice()
            .iter()
            .zip(&expected.v)
            .map(|(&a, &b)| (a as f64 - b).abs())
            .fold(0., f64::max);
        assert!(max_err < 1e-3, "max error {max_err}");
    }

    #[test]
    fn test_shape_propagation() {
        let generator = Generator::new(&test_utils::random_weights(1, |_| false)).unwrap();
        let values = (0..256 * 256 * 3)
            .map(|i| (i % 251) as f32 / 250.)
            .collect::<Vec<_>>();
        let input = Tensor::new(&[256, 256, 3], values);
        let output = generator.evaluate(&CpuKernels, &input).unwrap();
        assert_eq!(output.shape(), &[256, 256, 3]);
        assert!(output
            .as_slice()
            .iter()
            .all(|&x| (0. ..=1.).contains(&x)));
    }

    #[test]
    fn test_deterministic() {
        let generator = Generator::new(&test_utils::random_weights(1, |_| false)).unwrap();
        let input = Tensor::new(&[256, 256, 3], vec![0.5; 256 * 256 * 3]);
        let a = generator.evaluate(&CpuKernels, &input).unwrap();
        let b = generator.evaluate(&CpuKernels, &input.view()).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_bad_input() {
        let generator = Generator::new(&test_utils::random_weights(1, |_| false)).unwrap();
        for shape in [[256, 256, 4], [255, 256, 3], [256, 128, 3], [0, 256, 3]] {
            let input = Tensor::alloc(&shape);
            assert_eq!(
                generator.evaluate(&CpuKernels, &input).err(),
                Some(EvalError::Input(shape.to_vec())),
            );
        }
        let input = Tensor::alloc(&[256, 256]);
        assert!(matches!(
            generator.evaluate(&CpuKernels, &input),
            Err(EvalError::Input(_))
        ));
    }

    #[test]
    fn test_real_weights() {
        let Some(path) = common::test_weights::find() else {
            return;
        };
        let bytes = std::fs::read(path).unwrap();
        let weights = pict::decode(&bytes).unwrap();
        let generator = Generator::new(&weights).unwrap();
        let input = Tensor::new(&[256, 256, 3], vec![0.5; 256 * 256 * 3]);
        let output = generator.evaluate(&CpuKernels, &input).unwrap();
        assert_eq!(output.shape(), &[256, 256, 3]);
    }
}
