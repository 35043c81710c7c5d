use crate::{EvalError, Generator, GeneratorConfig, Role, Stage, StageStorage, DEPTH};
use pict::Weights;
use tensor::{udim, Storage, Tensor};

impl Generator {
    /// Collects and validates every generator parameter from `weights`.
    ///
    /// Names are checked in execution order first, so the error names the
    /// earliest missing parameter; shapes are checked after.
    pub fn new(weights: &Weights) -> Result<Self, EvalError> {
        if let Some(name) = Stage::required_names().find(|name| !weights.contains(name)) {
            return Err(EvalError::MissingWeight(name));
        }

        let mut encoders = Vec::with_capacity(DEPTH as usize);
        let mut channels = 3;
        for i in 1..=DEPTH {
            let storage = load_stage(weights, Stage::Encoder(i), channels)?;
            channels = storage.channels();
            encoders.push(storage);
        }

        let mut decoders = Vec::with_capacity(DEPTH as usize);
        for i in (1..=DEPTH).rev() {
            if i < DEPTH {
                channels += encoders[i as usize - 1].channels();
            }
            let stage = Stage::Decoder(i);
            let storage = load_stage(weights, stage, channels)?;
            if i == 1 && storage.channels() != 3 {
                let name = stage.name(Role::Kernel);
                return Err(shape_error(name, &storage.kernel, "[_, _, 3, _]".into()));
            }
            channels = storage.channels();
            decoders.push(storage);
        }
        decoders.reverse();

        info!(
            "generator loaded: {} parameters, base width {}",
            Stage::required_names().count(),
            encoders[0].channels(),
        );
        Ok(Self {
            config: GeneratorConfig::default(),
            encoders,
            decoders,
        })
    }

    /// Activation shapes after each stage for an `h × w` input, in execution order.
    pub fn stage_shapes(&self, h: udim, w: udim) -> Vec<(Stage, [udim; 3])> {
        let mut ans = Vec::with_capacity(2 * DEPTH as usize);
        let (mut h, mut w) = (h, w);
        for (i, s) in self.encoders.iter().enumerate() {
            h = h.div_ceil(2);
            w = w.div_ceil(2);
            ans.push((Stage::Encoder(i as u8 + 1), [h, w, s.channels()]));
        }
        for (i, s) in self.decoders.iter().enumerate().rev() {
            h *= 2;
            w *= 2;
            ans.push((Stage::Decoder(i as u8 + 1), [h, w, s.channels()]));
        }
        ans
    }
}

/// Reads one stage whose input has `ci` channels.
fn load_stage(weights: &Weights, stage: Stage, ci: udim) -> Result<StageStorage, EvalError> {
    let get = |role: Role| {
        let name = stage.name(role);
        match weights.get(&name) {
            Some(t) => Ok((name, t.clone())),
            None => Err(EvalError::MissingWeight(name)),
        }
    };

    let (name, kernel) = get(Role::Kernel)?;
    // conv kernels are [kh, kw, in, out], transposed ones [kh, kw, out, in]
    let (kernel_in, co, expected) = match (stage, kernel.shape()) {
        (Stage::Encoder(_), &[kh, kw, i, o]) if kh > 0 && kw > 0 => (i, o, format!("[_, _, {ci}, _]")),
        (Stage::Decoder(_), &[kh, kw, o, i]) if kh > 0 && kw > 0 => (i, o, format!("[_, _, _, {ci}]")),
        _ => return Err(shape_error(name, &kernel, "a non-empty rank 4 kernel".into())),
    };
    if kernel_in != ci || co == 0 {
        return Err(shape_error(name, &kernel, expected));
    }

    let channel_vector = |role: Role| {
        let (name, t) = get(role)?;
        if t.shape() == [co] {
            Ok(t)
        } else {
            Err(shape_error(name, &t, format!("[{co}]")))
        }
    };
    let bias = channel_vector(Role::Bias)?;
    let norm = if stage.is_normalized() {
        Some((channel_vector(Role::Gamma)?, channel_vector(Role::Beta)?))
    } else {
        None
    };

    trace!("{stage:?} kernel {:?}", kernel.shape());
    Ok(StageStorage { kernel, bias, norm })
}

fn shape_error(name: String, t: &Tensor<Storage>, expected: String) -> EvalError {
    EvalError::Shape {
        name,
        shape: t.shape().to_vec(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use crate::{test_utils, EvalError, Generator, Stage};
    use tensor::Tensor;

    #[test]
    fn test_missing_weight() {
        let weights = test_utils::random_weights(1, |name| {
            name == "generator/encoder_4/conv2d/kernel" || name.starts_with("generator/decoder_2/")
        });
        assert_eq!(
            Generator::new(&weights).err(),
            Some(EvalError::MissingWeight(
                "generator/encoder_4/conv2d/kernel".into()
            )),
        );
    }

    #[test]
    fn test_wrong_kernel() {
        let mut entries = test_utils::random_entries(1);
        let (_, kernel) = entries
            .iter_mut()
            .find(|(name, _)| name == "generator/encoder_3/conv2d/kernel")
            .unwrap();
        // input channels of encoder 3 should be 2
        *kernel = Tensor::alloc(&[4, 4, 3, 4]);
        let weights = test_utils::pack(&entries);
        match Generator::new(&weights) {
            Err(EvalError::Shape { name, shape, .. }) => {
                assert_eq!(name, "generator/encoder_3/conv2d/kernel");
                assert_eq!(shape, [4, 4, 3, 4]);
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_wrong_gamma() {
        let mut entries = test_utils::random_entries(1);
        let (_, gamma) = entries
            .iter_mut()
            .find(|(name, _)| name == "generator/decoder_5/batch_normalization/gamma")
            .unwrap();
        *gamma = Tensor::alloc(&[3]);
        let weights = test_utils::pack(&entries);
        assert!(matches!(
            Generator::new(&weights),
            Err(EvalError::Shape { ref name, .. }) if name == "generator/decoder_5/batch_normalization/gamma"
        ));
    }

    #[test]
    fn test_rank() {
        let mut entries = test_utils::random_entries(1);
        entries[0].1 = Tensor::alloc(&[4, 4, 3]);
        let weights = test_utils::pack(&entries);
        assert!(matches!(
            Generator::new(&weights),
            Err(EvalError::Shape { ref name, .. }) if name == "generator/encoder_1/conv2d/kernel"
        ));
    }

    #[test]
    fn test_stage_shapes() {
        let generator = Generator::new(&test_utils::random_weights(2, |_| false)).unwrap();
        let shapes = generator.stage_shapes(256, 512);
        assert_eq!(shapes.len(), 16);
        assert_eq!(shapes[0], (Stage::Encoder(1), [128, 256, 2]));
        assert_eq!(shapes[7], (Stage::Encoder(8), [1, 2, 16]));
        assert_eq!(shapes[8], (Stage::Decoder(8), [2, 4, 16]));
        assert_eq!(shapes[15], (Stage::Decoder(1), [256, 512, 3]));
    }
}
