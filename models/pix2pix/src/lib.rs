//! The pix2pix U-Net generator: eight stride-2 encoder stages, eight decoder
//! stages mirroring them, each decoder fed the matching encoder output.

mod compute;
mod error;
mod load;
mod stage;

#[macro_use]
extern crate log;

use common_devices::Kernels;
use std::ops::DerefMut;
use tensor::{Storage, Tensor};

pub use error::EvalError;
pub use stage::{Role, Stage, DEPTH};

/// Numeric constants of the generator.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub epsilon: f32,
    pub leaky_slope: f32,
}

impl Default for GeneratorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            leaky_slope: 0.2,
        }
    }
}

/// Validated generator weights, ready for any number of passes.
pub struct Generator {
    pub config: GeneratorConfig,
    /// `encoders[i]` is stage `encoder_{i + 1}`.
    encoders: Vec<StageStorage>,
    /// `decoders[i]` is stage `decoder_{i + 1}`.
    decoders: Vec<StageStorage>,
}

pub(crate) struct StageStorage {
    pub kernel: Tensor<Storage>,
    pub bias: Tensor<Storage>,
    /// `(gamma, beta)`, absent on the first encoder and the last decoder.
    pub norm: Option<(Tensor<Storage>, Tensor<Storage>)>,
}

impl StageStorage {
    /// Output channels of the stage.
    #[inline]
    pub fn channels(&self) -> u32 {
        self.bias.shape()[0]
    }
}

impl Generator {
    /// Typed access to one parameter.
    pub fn weight(&self, stage: Stage, role: Role) -> Option<&Tensor<Storage>> {
        let s = match stage {
            Stage::Encoder(i) => self.encoders.get(i.checked_sub(1)? as usize)?,
            Stage::Decoder(i) => self.decoders.get(i.checked_sub(1)? as usize)?,
        };
        match role {
            Role::Kernel => Some(&s.kernel),
            Role::Bias => Some(&s.bias),
            Role::Gamma => s.norm.as_ref().map(|(gamma, _)| gamma),
            Role::Beta => s.norm.as_ref().map(|(_, beta)| beta),
        }
    }
}

/// Maps pixel values from [0, 1] to [-1, 1].
#[inline]
pub fn preprocess<T>(kernels: &impl Kernels, x: &mut Tensor<T>)
where
    T: DerefMut<Target = [f32]>,
{
    kernels.scale_shift(x, 2., -1.);
}

/// Maps generator output from [-1, 1] back to [0, 1].
#[inline]
pub fn deprocess<T>(kernels: &impl Kernels, x: &mut Tensor<T>)
where
    T: DerefMut<Target = [f32]>,
{
    kernels.scale_shift(x, 0.5, 0.5);
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::{Role, Stage, DEPTH};
    use pict::{Dictionary, Weights};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tensor::Tensor;

    /// Output channels of encoder `i` for base width `ngf`.
    fn encoder_channels(i: u8, ngf: u32) -> u32 {
        ngf << (i - 1).min(3)
    }

    /// Random generator parameters with base width `ngf`, in execution order.
    pub fn random_entries(ngf: u32) -> Vec<(String, Tensor<Vec<f32>>)> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut entries = Vec::new();
        for stage in Stage::all() {
            let (kernel, co) = match stage {
                Stage::Encoder(i) => {
                    let ci = if i == 1 { 3 } else { encoder_channels(i - 1, ngf) };
                    let co = encoder_channels(i, ngf);
                    ([4, 4, ci, co], co)
                }
                Stage::Decoder(i) => {
                    let ci = if i == DEPTH {
                        encoder_channels(DEPTH, ngf)
                    } else {
                        encoder_channels(i, ngf) * 2
                    };
                    let co = if i == 1 { 3 } else { encoder_channels(i - 1, ngf) };
                    ([4, 4, co, ci], co)
                }
            };
            for &role in stage.roles() {
                let shape = match role {
                    Role::Kernel => kernel.to_vec(),
                    _ => vec![co],
                };
                let size = shape.iter().product::<u32>() as usize;
                let values = (0..size)
                    .map(|_| match role {
                        Role::Gamma => rng.gen_range(0.5..1.5),
                        _ => rng.gen_range(-0.1..0.1),
                    })
                    .collect::<Vec<f32>>();
                entries.push((stage.name(role), Tensor::new(&shape, values)));
            }
        }
        entries
    }

    /// Packs `entries` into a container and decodes it back.
    pub fn pack(entries: &[(String, Tensor<Vec<f32>>)]) -> Weights {
        let dictionary = Dictionary::fit(
            entries.iter().flat_map(|(_, t)| t.as_slice().iter().copied()),
            256,
        );
        let bytes = pict::encode(
            entries.iter().map(|(name, t)| (name.as_str(), t)),
            &dictionary,
        )
        .unwrap();
        pict::decode(&bytes).unwrap()
    }

    /// Random generator weights with base width `ngf`, minus the names `skip` rejects.
    pub fn random_weights(ngf: u32, skip: impl Fn(&str) -> bool) -> Weights {
        let mut entries = random_entries(ngf);
        entries.retain(|(name, _)| !skip(name));
        pack(&entries)
    }
}

#[test]
fn test_normalization_round_trip() {
    use common_cpu::CpuKernels;

    let values = (0..=1000).map(|i| i as f32 / 1000.).collect::<Vec<_>>();
    let mut x = Tensor::new(&[1001], values.clone());
    preprocess(&CpuKernels, &mut x);
    assert_eq!(x.as_slice()[0], -1.);
    assert_eq!(x.as_slice()[1000], 1.);
    deprocess(&CpuKernels, &mut x);
    for (a, b) in values.iter().zip(x.as_slice()) {
        assert!((a - b).abs() <= 1e-6, "{a} vs {b}");
    }
}

#[test]
fn test_typed_access() {
    let weights = test_utils::random_weights(2, |_| false);
    let generator = Generator::new(&weights).unwrap();
    let kernel = generator
        .weight(Stage::Encoder(3), Role::Kernel)
        .unwrap();
    assert_eq!(kernel.shape(), &[4, 4, 4, 8]);
    assert_eq!(
        generator.weight(Stage::Decoder(2), Role::Beta).unwrap().shape(),
        &[2]
    );
    assert!(generator.weight(Stage::Encoder(1), Role::Gamma).is_none());
    assert!(generator.weight(Stage::Decoder(1), Role::Beta).is_none());
    assert!(generator.weight(Stage::Encoder(9), Role::Kernel).is_none());
    assert!(generator.weight(Stage::Encoder(0), Role::Kernel).is_none());
}
